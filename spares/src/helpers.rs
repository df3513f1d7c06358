use chrono::{DateTime, NaiveTime, TimeZone, Utc};

/// Start (inclusive) and end (exclusive) of the UTC calendar day containing
/// `instant`. The daily-new-card boundary is fixed UTC, not per-user
/// timezone (see DESIGN.md for why).
pub fn utc_day_bounds(instant: &DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let date = instant.date_naive();
    let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    let end = start + chrono::Duration::days(1);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn day_bounds_span_exactly_one_day() {
        let instant = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2026, 8, 1)
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap(),
        );
        let (start, end) = utc_day_bounds(&instant);
        assert_eq!(end - start, chrono::Duration::days(1));
        assert!(start <= instant && instant < end);
    }
}
