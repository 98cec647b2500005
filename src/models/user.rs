use serde::{Deserialize, Serialize};

/// The authenticated account as the server reports it.
///
/// A `User` is always replaced wholesale from a server payload, never
/// merged field by field; the copy in the credential store and the copy
/// in the session state are snapshots of the same payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// Prayer time calculation method, e.g. "ISNA" or "MWL".
    #[serde(default)]
    pub calculation_method: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl User {
    /// Display name for the home screen greeting.
    pub fn display_name(&self) -> &str {
        if self.username.is_empty() {
            &self.email
        } else {
            &self.username
        }
    }
}

/// Partial settings update for `PUT /users/settings`.
///
/// Absent fields are skipped on the wire so the server leaves them
/// untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_parses_minimal_payload() {
        let json = r#"{"id":"u-1","email":"amina@example.com","username":"amina"}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, "u-1");
        assert_eq!(user.display_name(), "amina");
        assert!(user.calculation_method.is_none());
    }

    #[test]
    fn settings_skip_absent_fields() {
        let settings = UserSettings {
            calculation_method: Some("MWL".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, r#"{"calculation_method":"MWL"}"#);
    }
}
