// es-PE formatting for everything shown on the dashboard.
// Grouping separator ',' every three digits, decimal point '.', timestamps as d/m/yyyy, h:mm:ss a. m.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Formats `value` with at most `max_fraction_digits` decimals, trailing zeros dropped.
///
/// Rounding is half away from zero, so 2.5 kg shows as "3".
pub fn format_number(value: f64, max_fraction_digits: usize) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "∞".to_string() } else { "-∞".to_string() };
    }

    let scale = 10f64.powi(max_fraction_digits as i32);
    let mut rounded = (value * scale).round() / scale;
    if rounded == 0.0 {
        // avoid "-0"
        rounded = 0.0;
    }

    let plain = format!("{:.*}", max_fraction_digits, rounded.abs());
    let (int_part, frac_part) = match plain.split_once('.') {
        Some((i, f)) => (i, f.trim_end_matches('0')),
        None => (plain.as_str(), ""),
    };

    let mut out = String::with_capacity(plain.len() + plain.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Unpadded day and month, 12-hour clock with "a. m." / "p. m.".
pub fn format_timestamp<T: TimeZone>(at: &DateTime<T>) -> String
where
    T::Offset: std::fmt::Display,
{
    let meridiem = if at.hour() < 12 { "a. m." } else { "p. m." };
    format!("{} {}", at.format("%-d/%-m/%Y, %-I:%M:%S"), meridiem)
}

pub fn now_in(tz: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Lima;

    #[test]
    fn groups_thousands() {
        assert_eq!(format_number(0.0, 0), "0");
        assert_eq!(format_number(999.0, 0), "999");
        assert_eq!(format_number(1000.0, 0), "1,000");
        assert_eq!(format_number(1234567.0, 0), "1,234,567");
    }

    #[test]
    fn rounds_to_requested_digits() {
        assert_eq!(format_number(1234.5, 0), "1,235");
        assert_eq!(format_number(50.4, 0), "50");
        assert_eq!(format_number(3.25, 1), "3.3");
        assert_eq!(format_number(2.0, 1), "2");
        assert_eq!(format_number(12345.67, 1), "12,345.7");
    }

    #[test]
    fn negatives_and_negative_zero() {
        assert_eq!(format_number(-1500.0, 0), "-1,500");
        assert_eq!(format_number(-0.2, 0), "0");
    }

    #[test]
    fn timestamp_layout() {
        let at = Lima.with_ymd_and_hms(2026, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(format_timestamp(&at), "7/3/2026, 9:05:02 a. m.");
        let at = Lima.with_ymd_and_hms(2026, 11, 25, 18, 40, 0).unwrap();
        assert_eq!(format_timestamp(&at), "25/11/2026, 6:40:00 p. m.");
    }

    #[test]
    fn timestamp_noon_and_midnight() {
        let midnight = Lima.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_timestamp(&midnight), "1/1/2026, 12:00:00 a. m.");
        let noon = Lima.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(&noon), "1/1/2026, 12:00:00 p. m.");
    }

    #[test]
    fn now_in_uses_requested_zone() {
        assert_eq!(now_in(Lima).timezone(), Lima);
    }
}
