use anyhow::Result;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::utils::tui;

pub async fn run(app: &App) -> Result<()> {
    let coordinator = app.coordinator().await?;
    let events = coordinator.current_events();
    coordinator.shutdown().await;

    let service = app.digest_service();
    let spinner = tui::create_spinner("Sending digest...");
    let result = service.send(&events).await;
    spinner.finish_and_clear();
    let body = result?;

    println!("{}", "  Message sent".green());
    for line in body.lines() {
        println!("  {}", line.dimmed());
    }
    Ok(())
}
