use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

const CLOCK_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M:%S %p"];

/// Parses a calendar date from `YYYY-MM-DD` or any ISO timestamp that starts with one.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Some(prefix) = raw.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .ok()
}

/// Parses a wall-clock time in `HH:MM`, `HH:MM:SS` or 12h `HH:MM AM` form.
pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();

    CLOCK_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            // Full timestamps carry the time after the date.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .map(|dt| dt.time())
                .ok()
        })
}

/// `HH:MM` as shown in the UI.
pub fn format_ui_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// The backend exchanges times as `HH:MM:SS`; `HH:MM` input gets `:00` appended.
pub fn to_backend_time(raw: &str) -> Option<String> {
    parse_clock_time(raw).map(|t| t.format("%H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_time_appends_seconds() {
        assert_eq!(to_backend_time("09:00").as_deref(), Some("09:00:00"));
        assert_eq!(to_backend_time("14:35:10").as_deref(), Some("14:35:10"));
        assert_eq!(to_backend_time("2:15 PM").as_deref(), Some("14:15:00"));
        assert_eq!(to_backend_time("later"), None);
    }

    #[test]
    fn calendar_date_accepts_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert_eq!(parse_calendar_date("2024-05-01"), expected);
        assert_eq!(parse_calendar_date("2024-05-01T09:00:00"), expected);
        assert_eq!(parse_calendar_date("2024-05-01T09:00:00.000+00:00"), expected);
        assert_eq!(parse_calendar_date("01/05/2024"), None);
    }

    #[test]
    fn ui_time_drops_seconds() {
        let time = NaiveTime::from_hms_opt(9, 5, 30).expect("valid time");
        assert_eq!(format_ui_time(time), "09:05");
    }
}
