use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Error type for due-date input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DueError {
    #[error("invalid date: {0} (expected YYYY-MM-DD, today or tomorrow)")]
    InvalidDate(String),
    #[error("invalid time: {0} (expected HH:MM or h:mm am/pm)")]
    InvalidTime(String),
}

/// Time used when only a date is chosen
pub fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default()
}

/// Merge an optional date and an optional time of day into a single due
/// instant, interpreted in `now`'s time zone.
///
/// - neither → no due date
/// - date only → that date at 23:59:00
/// - time only → today at that time
/// - both → that date at that time
pub fn resolve_due<Tz: TimeZone>(
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    now: &DateTime<Tz>,
) -> Option<DateTime<Utc>> {
    if date.is_none() && time.is_none() {
        return None;
    }
    let day = date.unwrap_or_else(|| now.date_naive());
    let naive = day.and_time(time.unwrap_or_else(end_of_day));
    let tz = now.timezone();
    // A wall-clock time skipped by a DST jump lands an hour later
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse `today`, `tomorrow` or an ISO `YYYY-MM-DD` date
pub fn parse_date(input: &str, today: NaiveDate) -> Result<NaiveDate, DueError> {
    let trimmed = input.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "today" => Ok(today),
        "tomorrow" => today
            .succ_opt()
            .ok_or_else(|| DueError::InvalidDate(input.to_string())),
        _ => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map_err(|_| DueError::InvalidDate(input.to_string())),
    }
}

/// Parse a 24-hour `HH:MM` or a 12-hour `h:mm am/pm` time of day
pub fn parse_time(input: &str) -> Result<NaiveTime, DueError> {
    let err = || DueError::InvalidTime(input.to_string());
    let lower = input.trim().to_ascii_lowercase();

    let (clock, period) = if let Some(rest) = lower.strip_suffix("am") {
        (rest.trim_end(), Some(false))
    } else if let Some(rest) = lower.strip_suffix("pm") {
        (rest.trim_end(), Some(true))
    } else {
        (lower.as_str(), None)
    };

    let (h, m) = clock.split_once(':').ok_or_else(err)?;
    let mut hour: u32 = h.parse().map_err(|_| err())?;
    let minute: u32 = m.parse().map_err(|_| err())?;

    if let Some(pm) = period {
        if !(1..=12).contains(&hour) {
            return Err(err());
        }
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike};

    fn now_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 15, 30, 12).unwrap()
    }

    #[test]
    fn nothing_chosen_means_no_due_date() {
        assert_eq!(resolve_due(None, None, &now_utc()), None);
    }

    #[test]
    fn date_only_defaults_to_end_of_day() {
        let tomorrow = parse_date("tomorrow", now_utc().date_naive()).unwrap();
        let due = resolve_due(Some(tomorrow), None, &now_utc()).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2025, 5, 2, 23, 59, 0).unwrap());
        assert_eq!((due.hour(), due.minute(), due.second()), (23, 59, 0));
    }

    #[test]
    fn time_only_uses_today() {
        let time = parse_time("9:15 pm").unwrap();
        let due = resolve_due(None, Some(time), &now_utc()).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2025, 5, 1, 21, 15, 0).unwrap());
    }

    #[test]
    fn date_and_time_combine() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let time = parse_time("08:05").unwrap();
        let due = resolve_due(Some(date), Some(time), &now_utc()).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2025, 6, 10, 8, 5, 0).unwrap());
    }

    #[test]
    fn local_wall_clock_is_converted_to_utc() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
        let due = resolve_due(Some(date), None, &now).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2025, 5, 2, 21, 59, 0).unwrap());
    }

    #[test]
    fn twelve_hour_clock_edges() {
        assert_eq!(parse_time("12:00 am").unwrap(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(parse_time("12:30PM").unwrap(), NaiveTime::from_hms_opt(12, 30, 0).unwrap());
        assert_eq!(parse_time("1:05 am").unwrap(), NaiveTime::from_hms_opt(1, 5, 0).unwrap());
        assert!(parse_time("13:00 pm").is_err());
        assert!(parse_time("0:10 am").is_err());
    }

    #[test]
    fn rejects_malformed_input() {
        let today = now_utc().date_naive();
        assert!(parse_time("noon").is_err());
        assert!(parse_time("24:00").is_err());
        assert!(parse_time("10:60").is_err());
        assert_eq!(
            parse_date("next week", today),
            Err(DueError::InvalidDate("next week".into()))
        );
        assert!(parse_date("2025-02-30", today).is_err());
    }

    #[test]
    fn named_dates_are_case_insensitive() {
        let today = now_utc().date_naive();
        assert_eq!(parse_date("Today", today).unwrap(), today);
        assert_eq!(
            parse_date("2025-12-31", today).unwrap(),
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
    }
}
