use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use eventtracker_core::EventsView;
use owo_colors::OwoColorize;
use tracing::warn;

use crate::app::App;
use crate::render::render_rows;

/// How often the shared store file is checked for other writers.
const RELOAD_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run(app: &App, digest: bool) -> Result<()> {
    let coordinator = app.coordinator().await?;

    let digest_task = if digest {
        let service = Arc::new(app.digest_service());
        service.ensure_permission()?;
        Some(service.watch(coordinator.subscribe()))
    } else {
        None
    };

    let mut views = coordinator.subscribe();
    let initial = views.borrow_and_update().clone();
    print_view(&initial);
    println!("{}", "Watching for changes (Ctrl-C to stop)".dimmed());

    let mut reload = tokio::time::interval(RELOAD_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = reload.tick() => {
                if let Err(e) = app.store.reload().await {
                    warn!(error = %e, "could not reload event store");
                }
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                print_view(&view);
            }
        }
    }

    coordinator.shutdown().await;
    if let Some(task) = digest_task {
        task.abort();
    }
    Ok(())
}

fn print_view(view: &EventsView) {
    println!();
    println!("{}", format!("revision {}", view.revision).bold());
    println!("{}", render_rows(&view.events));

    if let Some(error) = &view.error {
        println!("{}", error.to_string().red());
    }
    if let Some(error) = &view.cache_error {
        println!("{}", format!("cache: {}", error).yellow());
    }
}
