//! Helpers for formatting numbers, times, and author names for output.

use chrono::{DateTime, Utc};

/// Truncate a string to `max` display columns, adding an ellipsis when
/// something was cut. Wide (CJK) characters count as two columns.
pub fn abbrev(s: &str, max: usize) -> String {
    console::truncate_str(s, max, "…").into_owned()
}

/// Pad a string on the right to `width` display columns, truncating first
/// if it is too long.
pub fn fill_right(s: &str, width: usize) -> String {
    let truncated = abbrev(s, width);
    let used = console::measure_text_width(&truncated);
    format!("{}{}", truncated, " ".repeat(width.saturating_sub(used)))
}

pub fn git_email(email: &str) -> String {
    format!("<{email}>")
}

/// Render `t` relative to `now`, e.g. "3 days ago".
pub fn relative_time(now: DateTime<Utc>, t: DateTime<Utc>) -> String {
    let minute = 60i64;
    let hour = minute * 60;
    let day = hour * 24;
    let week = day * 7;
    let month = day * 30;
    let year = day * 365;

    let secs = now.signed_duration_since(t).num_seconds();

    if secs < hour {
        format!("{} min. ago", secs / minute)
    } else if secs < day {
        let hours = secs / hour;
        if hours > 1 {
            format!("{hours} hr. ago")
        } else {
            format!("{hours} hour ago")
        }
    } else if secs < week {
        let days = secs / day;
        if days > 1 {
            format!("{days} days ago")
        } else {
            format!("{days} day ago")
        }
    } else if secs < month {
        let weeks = secs / week;
        if weeks > 1 {
            format!("{weeks} weeks ago")
        } else {
            format!("{weeks} week ago")
        }
    } else if secs < year {
        let months = secs / month;
        if months > 1 {
            format!("{months} mon. ago")
        } else {
            format!("{months} month ago")
        }
    } else {
        let years = secs / year;
        if years > 99 {
            ">99 yr. ago".to_string()
        } else if years > 1 {
            format!("{years} yr. ago")
        } else {
            format!("{years} year ago")
        }
    }
}

/// Adds a thousands comma and abbreviates numbers over a million.
///
/// Panics on negative input.
pub fn number(num: i64) -> String {
    if num < 0 {
        panic!("cannot format negative number");
    }

    if num > 100_000_000 {
        return ">99m".to_string();
    }

    if num > 1_000_000 {
        let mils = num as f64 / 1_000_000.0;
        return format!("{mils:.1}m");
    }

    if num > 1_000 {
        let ones = num % 1_000;
        let thousands = num / 1_000;
        return format!("{thousands},{ones:03}");
    }

    format!("{num}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn number_small_passes_through() {
        assert_eq!(number(0), "0");
        assert_eq!(number(999), "999");
    }

    #[test]
    fn number_adds_thousands_comma() {
        assert_eq!(number(1001), "1,001");
        assert_eq!(number(43_021), "43,021");
    }

    #[test]
    fn number_abbreviates_millions() {
        assert_eq!(number(1_234_567), "1.2m");
        assert_eq!(number(123_456_789), ">99m");
    }

    #[test]
    #[should_panic]
    fn number_panics_on_negative() {
        number(-1);
    }

    #[test]
    fn relative_time_year() {
        let now = Utc.with_ymd_and_hms(2024, 12, 30, 10, 13, 0).unwrap();
        let t = Utc.with_ymd_and_hms(2023, 10, 16, 17, 16, 5).unwrap();
        assert_eq!(relative_time(now, t), "1 year ago");
    }

    #[test]
    fn relative_time_minutes_and_days() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 11, 38, 0).unwrap();
        assert_eq!(relative_time(now, t), "22 min. ago");

        let t = Utc.with_ymd_and_hms(2024, 5, 29, 12, 0, 0).unwrap();
        assert_eq!(relative_time(now, t), "3 days ago");
    }

    #[test]
    fn abbrev_truncates_long_names() {
        assert_eq!(abbrev("short", 10), "short");
        assert_eq!(abbrev("a-rather-long-name", 10), "a-rather-…");
    }
}
