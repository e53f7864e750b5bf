use anyhow::{Result, bail};
use dialoguer::Input;
use eventtracker_core::CachePolicy;
use eventtracker_core::collab::AuthProvider;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::render::Render;

pub async fn register(app: &App, email: Option<String>) -> Result<()> {
    let email = prompt_email(email)?;
    let password = rpassword::prompt_password("  Password: ")?;
    let confirm = rpassword::prompt_password("  Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let session = app.accounts.create_account(&email, &password).await?;
    println!("{}", format!("  Account created for {}", session.display_name()).green());
    Ok(())
}

pub async fn login(app: &App, email: Option<String>) -> Result<()> {
    let email = prompt_email(email)?;
    let password = rpassword::prompt_password("  Password: ")?;

    let session = app.accounts.sign_in(&email, &password).await?;
    println!("{}", format!("  Signed in as {}", session.display_name()).green());
    Ok(())
}

pub async fn federated(app: &App, token: Option<String>) -> Result<()> {
    let token = match token {
        Some(token) => token,
        None => Input::<String>::new()
            .with_prompt("  Identity token")
            .allow_empty(true)
            .interact_text()?,
    };

    let session = app.accounts.sign_in_with_federated_token(&token).await?;
    println!("{}", format!("  Signed in as {}", session.display_name()).green());
    Ok(())
}

pub async fn logout(app: &App) -> Result<()> {
    if app.session.is_none() {
        println!("{}", "Not signed in".dimmed());
        return Ok(());
    }

    app.accounts.sign_out().await?;
    println!("Signed out.");
    Ok(())
}

pub async fn status(app: &App) -> Result<()> {
    match &app.session {
        Some(session) => println!("Signed in as {}", session.render()),
        None => println!("{}", "Not signed in".dimmed()),
    }

    if !app.config.remote.require_auth {
        println!("{}", "Events are readable without signing in (remote.require_auth = false)".dimmed());
    }

    println!(
        "{}",
        format!(
            "Collection {} in {}",
            app.store.root(),
            app.config.remote_file().display()
        )
        .dimmed()
    );
    let policy = match app.config.cache.policy {
        CachePolicy::Detached => "updated by `eventtracker cache sync`",
        CachePolicy::Mirror => "mirrors every change",
    };
    println!(
        "{}",
        format!("Cache {} ({})", app.config.cache_file().display(), policy).dimmed()
    );
    Ok(())
}

fn prompt_email(email: Option<String>) -> Result<String> {
    match email {
        Some(email) => Ok(email),
        None => Ok(Input::<String>::new().with_prompt("  Email").interact_text()?),
    }
}
