use anyhow::{Result, bail};
use owo_colors::OwoColorize;

use crate::app::App;
use crate::render::{Render, render_rows};
use crate::utils::tui;

pub async fn list(app: &App) -> Result<()> {
    let cache = app.open_cache().await?;
    let events = cache.get_events().await?;
    println!("{}", render_rows(&events));
    Ok(())
}

pub async fn get(app: &App, title: &str) -> Result<()> {
    let cache = app.open_cache().await?;
    match cache.get_event(title).await? {
        Some(event) => println!("{}", event.render()),
        None => bail!("No cached event titled '{}'", title),
    }
    Ok(())
}

pub async fn sync(app: &App) -> Result<()> {
    let coordinator = app.coordinator().await?;

    let spinner = tui::create_spinner("Mirroring events into the cache...");
    let result = coordinator.mirror_to_cache().await;
    spinner.finish_and_clear();
    coordinator.shutdown().await;

    let count = result?;
    println!("{}", format!("  Cached {} event(s)", count).green());
    Ok(())
}

pub async fn delete(app: &App, id: &str) -> Result<()> {
    let cache = app.open_cache().await?;
    match cache.delete_event(id).await? {
        0 => println!("{}", "Nothing to delete".dimmed()),
        rows => println!("{}", format!("  Deleted {} cached row(s)", rows).red()),
    }
    Ok(())
}
