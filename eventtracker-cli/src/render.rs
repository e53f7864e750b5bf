//! Terminal rendering for eventtracker types.
//!
//! This is the list presentation adapter: it turns an ordered slice of events
//! into numbered rows. Row numbers are what `delete --row` refers to.

use eventtracker_core::Event;
use eventtracker_core::collab::Session;
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for Event {
    fn render(&self) -> String {
        let title = if self.title.is_empty() {
            "(untitled)".to_string()
        } else {
            self.title.clone()
        };
        format!(
            "{}  {} {}  {}",
            title.bold(),
            self.date,
            self.time,
            self.id.dimmed()
        )
    }
}

impl Render for Session {
    fn render(&self) -> String {
        let since = self
            .signed_in_at
            .with_timezone(&chrono::Local)
            .format("%m/%d/%Y %-I:%M%p");
        format!(
            "{} {}",
            self.display_name().bold(),
            format!("({:?}, since {})", self.method, since).dimmed()
        )
    }
}

/// Numbered rows, starting at 1.
pub fn render_rows(events: &[Event]) -> String {
    if events.is_empty() {
        return "No events".dimmed().to_string();
    }

    let width = events.len().to_string().len();
    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            let row = format!("{:>width$}.", i + 1, width = width);
            format!("  {} {}", row.dimmed(), event.render())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Event at a 1-based row of `render_rows`.
pub fn event_at_row(events: &[Event], row: usize) -> Option<&Event> {
    row.checked_sub(1).and_then(|index| events.get(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events() -> Vec<Event> {
        (1..=12)
            .map(|i| Event::new(format!("k{i}"), format!("Event {i}"), "03/05/2024", "9:00AM"))
            .collect()
    }

    #[test]
    fn one_line_per_event() {
        let rendered = render_rows(&events());
        assert_eq!(rendered.lines().count(), 12);
        assert!(rendered.lines().nth(11).unwrap().contains("Event 12"));
    }

    #[test]
    fn rows_are_one_based() {
        let events = events();
        assert_eq!(event_at_row(&events, 1).unwrap().id, "k1");
        assert_eq!(event_at_row(&events, 12).unwrap().id, "k12");
        assert!(event_at_row(&events, 0).is_none());
        assert!(event_at_row(&events, 13).is_none());
    }
}
