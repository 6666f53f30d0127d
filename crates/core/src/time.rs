//! Wall-clock helpers. All scheduler times are UTC without a zone offset,
//! truncated to whole seconds.

use chrono::{NaiveDateTime, Timelike, Utc};

/// Current UTC time truncated to seconds.
pub fn now_utc() -> NaiveDateTime {
    truncate_to_seconds(Utc::now().naive_utc())
}

pub fn truncate_to_seconds(t: NaiveDateTime) -> NaiveDateTime {
    t.with_nanosecond(0).unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn truncation_drops_subsecond_part() {
        let t = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(10, 15, 30, 750)
            .unwrap();
        let truncated = truncate_to_seconds(t);
        assert_eq!(truncated.nanosecond(), 0);
        assert_eq!(truncated.second(), 30);
    }

    #[test]
    fn now_has_no_fraction() {
        assert_eq!(now_utc().nanosecond(), 0);
    }
}
