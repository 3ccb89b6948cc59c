use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use time::{OffsetDateTime, UtcOffset};

/// Timezone every public date on the site is shown in.
pub const SITE_TIMEZONE: Tz = chrono_tz::Europe::Istanbul;

pub fn localized_datetime(time: OffsetDateTime, tz: Tz) -> DateTime<Tz> {
    let utc = time.to_offset(UtcOffset::UTC);
    let seconds = utc.unix_timestamp();
    let nanos: u32 = utc.nanosecond();
    let datetime_utc = DateTime::<Utc>::from_timestamp(seconds, nanos)
        .or_else(|| DateTime::<Utc>::from_timestamp(seconds, 0))
        .unwrap_or_default();
    tz.from_utc_datetime(&datetime_utc.naive_utc())
}

/// Calendar parts `(year, month 1..=12, day)` of `time` in the given zone.
pub fn localized_ymd(time: OffsetDateTime, tz: Tz) -> (i32, u32, u32) {
    let localized = localized_datetime(time, tz);
    (localized.year(), localized.month(), localized.day())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn istanbul_is_three_hours_ahead_of_utc() {
        let (year, month, day) = localized_ymd(datetime!(2024-12-31 22:30 UTC), SITE_TIMEZONE);
        assert_eq!((year, month, day), (2025, 1, 1));
    }
}
