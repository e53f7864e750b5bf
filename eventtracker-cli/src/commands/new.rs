use anyhow::{Result, anyhow, bail};
use dialoguer::Input;
use eventtracker_core::EventDraft;
use eventtracker_core::format::{normalize_date, normalize_time};
use owo_colors::OwoColorize;

use crate::app::App;
use crate::render::Render;
use crate::utils::tui;

pub async fn run(
    app: &App,
    title: Option<String>,
    date: Option<String>,
    time: Option<String>,
) -> Result<()> {
    let interactive = title.is_none() || date.is_none() || time.is_none();

    // --- Title ---
    let title = match title {
        Some(t) => t,
        None => Input::<String>::new()
            .with_prompt("  Title")
            .allow_empty(true)
            .interact_text()?,
    };

    // --- Date ---
    let date = match date {
        Some(d) => normalize_date(&d).map_err(|e| anyhow!(e))?,
        None => prompt_with_retry("  Date (MM/DD/YYYY)", normalize_date)?,
    };

    // --- Time ---
    let time = match time {
        Some(t) => normalize_time(&t).map_err(|e| anyhow!(e))?,
        None => prompt_with_retry("  Time (9:00AM)", normalize_time)?,
    };

    let draft = EventDraft::new(title.trim(), date, time);
    let missing = draft.missing_fields();
    if !missing.is_empty() {
        let names: Vec<_> = missing.iter().map(|f| f.to_string()).collect();
        bail!("Data missing! ({})", names.join(", "));
    }

    let coordinator = app.coordinator().await?;

    let spinner = tui::create_spinner("Saving event...");
    let result = coordinator.add_event(draft).await;
    spinner.finish_and_clear();
    coordinator.shutdown().await;

    let event = result?;
    if interactive {
        println!();
    }
    println!("{}", "  Added Data!".green());
    println!("  {}", event.render());

    Ok(())
}

/// Prompt until `parse` accepts the input.
pub fn prompt_with_retry<F>(prompt: &str, parse: F) -> Result<String>
where
    F: Fn(&str) -> Result<String, String>,
{
    loop {
        let input: String = Input::new().with_prompt(prompt).interact_text()?;
        match parse(&input) {
            Ok(result) => return Ok(result),
            Err(e) => {
                eprintln!("  {}", e.red());
            }
        }
    }
}
