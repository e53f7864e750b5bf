use anyhow::Result;
use clap::ValueEnum;
use eventtracker_core::Event;
use eventtracker_core::format::sort_chronologically;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::render::render_rows;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    /// Store order (creation order)
    Key,
    /// Calendar date and time; unparseable dates last
    Date,
}

pub async fn run(app: &App, sort: SortKey, json: bool) -> Result<()> {
    let coordinator = app.coordinator().await?;
    let view = coordinator.view();
    coordinator.shutdown().await;

    let events = sorted(&view.events, sort);
    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
    } else {
        println!("{}", render_rows(&events));
    }

    if let Some(error) = &view.error {
        eprintln!("{}", error.to_string().red());
    }
    Ok(())
}

pub fn sorted(events: &[Event], sort: SortKey) -> Vec<Event> {
    let mut events = events.to_vec();
    if sort == SortKey::Date {
        sort_chronologically(&mut events);
    }
    events
}
