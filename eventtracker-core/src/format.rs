//! Display formats for event dates and times.
//!
//! Events store their date as `MM/DD/YYYY` and their time as a 12-hour clock
//! string like `9:00AM`. Pickers, forms and the list view all go through these
//! helpers so the formats stay identical everywhere.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::event::Event;

const DISPLAY_DATE: &str = "%m/%d/%Y";
const ISO_DATE: &str = "%Y-%m-%d";

/// Format a date as `MM/DD/YYYY`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DISPLAY_DATE).to_string()
}

/// Format a clock reading as `H:MMAM` / `H:MMPM`.
pub fn format_time(time: NaiveTime) -> String {
    let (pm, hour) = time.hour12();
    format!("{}:{:02}{}", hour, time.minute(), if pm { "PM" } else { "AM" })
}

/// Parse a `MM/DD/YYYY` date.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DISPLAY_DATE).ok()
}

/// Parse a `H:MMAM` / `H:MMPM` time (case-insensitive, optional space before the suffix).
pub fn parse_time(input: &str) -> Option<NaiveTime> {
    let upper = input.trim().to_ascii_uppercase();
    let (clock, pm) = if let Some(rest) = upper.strip_suffix("PM") {
        (rest.trim_end(), true)
    } else if let Some(rest) = upper.strip_suffix("AM") {
        (rest.trim_end(), false)
    } else {
        return None;
    };

    let (hour, minute) = clock.split_once(':')?;
    if minute.len() != 2 {
        return None;
    }
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }

    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Accept `YYYY-MM-DD` or `MM/DD/YYYY` and return the display form.
pub fn normalize_date(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, ISO_DATE)
        .ok()
        .or_else(|| parse_date(trimmed))
        .map(format_date)
        .ok_or_else(|| {
            format!(
                "Invalid date '{}'. Expected MM/DD/YYYY or YYYY-MM-DD",
                input
            )
        })
}

/// Accept `9:00AM`, `09:00` or `21:30` and return the display form.
pub fn normalize_time(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    parse_time(trimmed)
        .or_else(|| NaiveTime::parse_from_str(trimmed, "%H:%M").ok())
        .map(format_time)
        .ok_or_else(|| format!("Invalid time '{}'. Expected H:MMAM, H:MMPM or HH:MM", input))
}

/// Calendar position of an event, if its date parses. Unparseable times count as midnight.
pub fn calendar_key(event: &Event) -> Option<NaiveDateTime> {
    let date = parse_date(&event.date)?;
    let time = parse_time(&event.time).unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time))
}

/// Sort events by calendar date and time. Events whose dates don't parse go last,
/// keeping their relative order.
pub fn sort_chronologically(events: &mut [Event]) {
    events.sort_by_key(|event| {
        let key = calendar_key(event);
        (key.is_none(), key)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_date_zero_pads_month_and_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(format_date(date), "03/05/2024");
    }

    #[test]
    fn format_date_keeps_two_digit_months() {
        let date = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        assert_eq!(format_date(date), "10/01/2024");
    }

    #[test]
    fn format_time_uses_twelve_hour_clock() {
        let at = |h, m| format_time(NaiveTime::from_hms_opt(h, m, 0).unwrap());
        assert_eq!(at(0, 5), "12:05AM");
        assert_eq!(at(9, 0), "9:00AM");
        assert_eq!(at(11, 59), "11:59AM");
        assert_eq!(at(12, 0), "12:00PM");
        assert_eq!(at(13, 30), "1:30PM");
        assert_eq!(at(23, 7), "11:07PM");
    }

    #[test]
    fn out_of_range_clock_readings_never_reach_the_formatter() {
        assert_eq!(NaiveTime::from_hms_opt(24, 0, 0).map(format_time), None);
        assert_eq!(NaiveTime::from_hms_opt(13, 60, 0).map(format_time), None);
        assert!(normalize_time("24:00").is_err());
        assert!(normalize_time("13:60").is_err());
    }

    #[test]
    fn parse_time_reads_display_form() {
        assert_eq!(parse_time("9:00AM"), NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(parse_time("12:00am"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(parse_time("12:15PM"), NaiveTime::from_hms_opt(12, 15, 0));
        assert_eq!(parse_time("1:30 pm"), NaiveTime::from_hms_opt(13, 30, 0));
    }

    #[test]
    fn parse_time_rejects_garbage() {
        assert_eq!(parse_time("13:00PM"), None);
        assert_eq!(parse_time("9:0AM"), None);
        assert_eq!(parse_time("9:00"), None);
        assert_eq!(parse_time("noon"), None);
    }

    #[test]
    fn normalize_accepts_iso_and_display_inputs() {
        assert_eq!(normalize_date("2024-03-05").unwrap(), "03/05/2024");
        assert_eq!(normalize_date("03/05/2024").unwrap(), "03/05/2024");
        assert!(normalize_date("March 5").is_err());

        assert_eq!(normalize_time("09:00").unwrap(), "9:00AM");
        assert_eq!(normalize_time("21:30").unwrap(), "9:30PM");
        assert_eq!(normalize_time("9:00am").unwrap(), "9:00AM");
        assert!(normalize_time("25:00").is_err());
    }

    #[test]
    fn chronological_sort_differs_from_lexical_order() {
        let mut events = vec![
            Event::new("a", "Later", "01/02/2024", "9:00AM"),
            Event::new("b", "Earlier", "12/01/2023", "9:00AM"),
            Event::new("c", "Broken", "someday", "9:00AM"),
            Event::new("d", "Same day, evening", "01/02/2024", "8:00PM"),
        ];
        sort_chronologically(&mut events);
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "d", "c"]);
    }
}
