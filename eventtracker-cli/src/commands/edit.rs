use anyhow::{Result, anyhow, bail};
use dialoguer::{Input, Select};
use eventtracker_core::EventField;
use eventtracker_core::format::{normalize_date, normalize_time};
use owo_colors::OwoColorize;

use crate::app::App;
use crate::commands::new::prompt_with_retry;
use crate::render::Render;

pub async fn run(
    app: &App,
    id: &str,
    title: Option<String>,
    date: Option<String>,
    time: Option<String>,
) -> Result<()> {
    let coordinator = app.coordinator().await?;
    let Some(current) = coordinator.view().get(id).cloned() else {
        coordinator.shutdown().await;
        bail!("No event with id '{}'", id);
    };

    let mut changes = Vec::new();
    if let Some(title) = title {
        changes.push((EventField::Title, title.trim().to_string()));
    }
    if let Some(date) = date {
        changes.push((EventField::Date, normalize_date(&date).map_err(|e| anyhow!(e))?));
    }
    if let Some(time) = time {
        changes.push((EventField::Time, normalize_time(&time).map_err(|e| anyhow!(e))?));
    }
    if changes.is_empty() {
        changes.push(prompt_change(&current)?);
    }

    if changes.iter().any(|(field, value)| *field == EventField::Title && value.is_empty()) {
        coordinator.shutdown().await;
        bail!("Data missing! (title)");
    }

    let mut updated = current.clone();
    for (field, value) in &changes {
        if let Err(e) = coordinator.edit_event_field(id, *field, value).await {
            coordinator.shutdown().await;
            return Err(e.into());
        }
        updated.set_field(*field, value.clone());
    }
    coordinator.shutdown().await;

    println!("{}", "  Updated".yellow());
    println!("  {}", updated.render());
    Ok(())
}

fn prompt_change(current: &eventtracker_core::Event) -> Result<(EventField, String)> {
    let labels: Vec<String> = EventField::ALL
        .iter()
        .map(|field| format!("{} ({})", field, current.field(*field)))
        .collect();

    let selection = Select::new()
        .with_prompt("  Change which field?")
        .items(&labels)
        .default(1)
        .interact()?;

    let field = EventField::ALL[selection];
    let value = match field {
        EventField::Title => Input::<String>::new()
            .with_prompt("  Title")
            .with_initial_text(current.title.clone())
            .interact_text()?,
        EventField::Date => prompt_with_retry("  Date (MM/DD/YYYY)", normalize_date)?,
        EventField::Time => prompt_with_retry("  Time (9:00AM)", normalize_time)?,
    };

    Ok((field, value))
}
