//! Miqat CLI - a terminal stand-in for the mobile login/registration
//! and home screens.
//!
//! The mobile shells render these flows natively; this binary drives
//! the same session manager from a prompt loop, which keeps the core
//! exercisable end to end without a device.

use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use miqat_core::{Config, CredentialStore, SessionManager, StartupOutcome, UserSettings};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    info!("Miqat CLI starting");

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    let data_dir = config.data_dir().context("No usable data directory")?;
    let store = CredentialStore::open(data_dir)
        .await
        .context("Failed to open credential store")?;
    let manager = SessionManager::new(config.api_base_url.clone(), store)?;

    match manager.startup().await {
        StartupOutcome::Verified(user) => {
            println!("Welcome back, {}!", user.display_name());
        }
        StartupOutcome::NoSession => {}
        StartupOutcome::Invalidated => {
            println!("Your session has expired. Please log in again.");
        }
    }

    run_loop(&manager).await?;

    info!("Miqat CLI shutting down");
    Ok(())
}

async fn run_loop(manager: &SessionManager) -> Result<()> {
    loop {
        let session = manager.snapshot().await;

        if session.is_authenticated {
            print_home(&session);
            match prompt("[s]ettings, [l]ogout, [q]uit: ")?.as_str() {
                "s" => update_settings(manager).await?,
                "l" => {
                    manager.logout().await;
                    println!("Logged out.\n");
                }
                "q" => return Ok(()),
                _ => {}
            }
        } else {
            if let Some(ref error) = session.error {
                println!("Error: {}\n", error);
                manager.clear_error().await;
            }
            match prompt("[l]ogin, [r]egister, [q]uit: ")?.as_str() {
                "l" => login(manager).await,
                "r" => register(manager).await,
                "q" => return Ok(()),
                _ => {}
            }
        }
    }
}

fn print_home(session: &miqat_core::SessionSnapshot) {
    if let Some(ref user) = session.user {
        println!("\n=== Miqat ===");
        println!("Signed in as {} <{}>", user.username, user.email);
        println!("  User ID:            {}", user.id);
        println!(
            "  Calculation method: {}",
            user.calculation_method.as_deref().unwrap_or("ISNA")
        );
        if let Some(ref location) = user.location {
            println!("  Location:           {}", location);
        }
        if let Some(ref timezone) = user.timezone {
            println!("  Timezone:           {}", timezone);
        }
        println!();
    }
}

async fn login(manager: &SessionManager) {
    println!("\n=== Miqat Login ===\n");
    let (email, password) = match read_credentials() {
        Ok(pair) => pair,
        Err(e) => {
            println!("Error: {}\n", e);
            return;
        }
    };

    // A failure lands in the error slot; the main loop prints it.
    if let Ok(user) = manager.login(&email, &password).await {
        println!("Login successful! Welcome, {}.\n", user.display_name());
    }
}

async fn register(manager: &SessionManager) {
    println!("\n=== Miqat Registration ===\n");
    let email = match prompt("Email: ") {
        Ok(s) => s,
        Err(e) => {
            println!("Error: {}\n", e);
            return;
        }
    };
    let username = match prompt("Username: ") {
        Ok(s) => s,
        Err(e) => {
            println!("Error: {}\n", e);
            return;
        }
    };
    let password = match rpassword::prompt_password("Password: ") {
        Ok(s) => s,
        Err(e) => {
            println!("Error: {}\n", e);
            return;
        }
    };

    // A failure lands in the error slot; the main loop prints it.
    if let Ok(user) = manager.register(&email, &username, &password).await {
        println!("Welcome to Miqat, {}!\n", user.display_name());
    }
}

async fn update_settings(manager: &SessionManager) -> Result<()> {
    let method = prompt("Calculation method (e.g. ISNA, MWL, blank to keep): ")?;
    if method.is_empty() {
        return Ok(());
    }

    let settings = UserSettings {
        calculation_method: Some(method),
        ..Default::default()
    };
    match manager.update_settings(&settings).await {
        Ok(_) => println!("Settings saved.\n"),
        Err(e) => println!("Update failed: {}\n", e),
    }
    Ok(())
}

fn read_credentials() -> Result<(String, String)> {
    let email = prompt("Email: ")?;
    let password = rpassword::prompt_password("Password: ")?;
    Ok((email, password))
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
