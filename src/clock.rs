use chrono::{DateTime, Local, TimeZone};

/// Rendered clock panel content. The shell repaints this on a one-second
/// interval while the clock is visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockDisplay {
    /// 12-hour time, e.g. "9:05 AM"
    pub time: String,
    /// Long date, e.g. "Monday, January 5 2026"
    pub date: String,
}

/// Render the clock for a given instant.
pub fn render_at<Tz: TimeZone>(now: DateTime<Tz>) -> ClockDisplay
where
    Tz::Offset: std::fmt::Display,
{
    ClockDisplay {
        time: now.format("%-I:%M %p").to_string(),
        date: now.format("%A, %B %-d %Y").to_string(),
    }
}

/// Render the clock for the current local time.
pub fn render_now() -> ClockDisplay {
    render_at(Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_time_is_twelve_hour() {
        let display = render_at(Utc.with_ymd_and_hms(2026, 1, 5, 14, 7, 30).unwrap());
        assert_eq!(display.time, "2:07 PM");

        let display = render_at(Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap());
        assert_eq!(display.time, "12:00 AM");
    }

    #[test]
    fn test_date_has_no_comma_before_year() {
        let display = render_at(Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap());
        assert_eq!(display.date, "Monday, January 5 2026");
    }
}
