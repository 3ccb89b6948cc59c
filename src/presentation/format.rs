//! Turkish date and reading-time labels.

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::util::timezone::{SITE_TIMEZONE, localized_ymd};

const SHORT_MONTHS: [&str; 12] = [
    "Oca", "Şub", "Mar", "Nis", "May", "Haz", "Tem", "Ağu", "Eyl", "Eki", "Kas", "Ara",
];

const LONG_MONTHS: [&str; 12] = [
    "Ocak", "Şubat", "Mart", "Nisan", "Mayıs", "Haziran", "Temmuz", "Ağustos", "Eylül", "Ekim",
    "Kasım", "Aralık",
];

/// `05 Oca 2024`, as shown in the blog list.
pub fn list_date(at: OffsetDateTime) -> String {
    let (year, month, day) = localized_ymd(at, SITE_TIMEZONE);
    format!("{day:02} {} {year}", month_name(&SHORT_MONTHS, month))
}

/// `5 Ocak 2024`, as shown on a post.
pub fn long_date(at: OffsetDateTime) -> String {
    let (year, month, day) = localized_ymd(at, SITE_TIMEZONE);
    format!("{day} {} {year}", month_name(&LONG_MONTHS, month))
}

pub fn iso_date(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

pub fn reading_time(minutes: usize) -> String {
    format!("{minutes} dk")
}

pub fn reading_time_long(minutes: usize) -> String {
    format!("{minutes} dk okuma")
}

fn month_name(names: &'static [&'static str; 12], month: u32) -> &'static str {
    let index = month.clamp(1, 12) as usize - 1;
    names[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn dates_use_istanbul_calendar_day() {
        // 22:30 UTC on the 4th is already the 5th in Istanbul (UTC+3).
        let at = datetime!(2024-01-04 22:30 UTC);
        assert_eq!(list_date(at), "05 Oca 2024");
        assert_eq!(long_date(at), "5 Ocak 2024");
    }

    #[test]
    fn months_with_turkish_letters() {
        assert_eq!(list_date(datetime!(2023-08-15 12:00 UTC)), "15 Ağu 2023");
        assert_eq!(long_date(datetime!(2023-02-01 12:00 UTC)), "1 Şubat 2023");
        assert_eq!(long_date(datetime!(2023-12-31 12:00 UTC)), "31 Aralık 2023");
    }

    #[test]
    fn reading_labels() {
        assert_eq!(reading_time(3), "3 dk");
        assert_eq!(reading_time_long(1), "1 dk okuma");
    }
}
