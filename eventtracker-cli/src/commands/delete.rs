use anyhow::{Result, bail};
use owo_colors::OwoColorize;

use crate::app::App;
use crate::render::{Render, event_at_row};
use crate::utils::tui;

pub enum DeleteTarget {
    Id(String),
    /// 1-based row of `eventtracker events` (store order)
    Row(usize),
}

pub async fn run(app: &App, target: DeleteTarget) -> Result<()> {
    let coordinator = app.coordinator().await?;
    let events = coordinator.current_events();

    let event = match &target {
        DeleteTarget::Id(id) => events.iter().find(|e| &e.id == id),
        DeleteTarget::Row(row) => event_at_row(&events, *row),
    };
    let Some(event) = event.cloned() else {
        coordinator.shutdown().await;
        match target {
            DeleteTarget::Id(id) => bail!("No event with id '{}'", id),
            DeleteTarget::Row(row) => bail!("No event at row {} ({} listed)", row, events.len()),
        }
    };

    let spinner = tui::create_spinner("Deleting event...");
    let result = coordinator.delete_event(&event.id).await;
    spinner.finish_and_clear();
    coordinator.shutdown().await;
    result?;

    println!("{}", "  Deleted".red());
    println!("  {}", event.render());
    Ok(())
}
