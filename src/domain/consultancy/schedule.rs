//! Office hours and spoken date/time parsing

use chrono::{Datelike, Duration, NaiveDate, Weekday};

const WEEKDAY_SLOTS: &[&str] = &[
    "9:00 AM", "10:00 AM", "11:00 AM", "2:00 PM", "3:00 PM", "4:00 PM", "5:00 PM",
];
const SATURDAY_SLOTS: &[&str] = &["10:00 AM", "11:00 AM", "12:00 PM", "1:00 PM"];

pub const OFFICE_HOURS: &str =
    "Monday through Friday 9 AM to 6 PM, and Saturday 10 AM to 2 PM";

/// Bookable consultation slots for a weekday
pub fn slots_for(day: Weekday) -> &'static [&'static str] {
    match day {
        Weekday::Sat => SATURDAY_SLOTS,
        Weekday::Sun => &[],
        _ => WEEKDAY_SLOTS,
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// "May 01, 2024"
pub fn format_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

/// Resolve a spoken or written date relative to `today`.
///
/// Accepts "today", "tomorrow", weekday names (next occurrence, never today),
/// ISO dates, "May 1", "May 1st", "Jun 3" and "05/01". Month-day forms that
/// already passed this year roll over to next year.
pub fn parse_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = input.trim().to_lowercase();
    match text.as_str() {
        "" => return None,
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        _ => {}
    }

    if let Ok(day) = text.parse::<Weekday>() {
        let current = today.weekday().num_days_from_monday() as i64;
        let target = day.num_days_from_monday() as i64;
        let mut ahead = (target - current).rem_euclid(7);
        if ahead == 0 {
            ahead = 7;
        }
        return Some(today + Duration::days(ahead));
    }

    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        return Some(date);
    }

    let text = strip_ordinal(&text);
    let with_year = format!("{} {}", text, today.year());
    ["%B %d %Y", "%m/%d %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&with_year, fmt).ok())
        .map(|date| {
            if date < today {
                date.with_year(today.year() + 1).unwrap_or(date)
            } else {
                date
            }
        })
}

fn strip_ordinal(text: &str) -> String {
    let mut out = text.to_string();
    for suffix in ["st", "nd", "rd", "th"] {
        if let Some(stripped) = text.strip_suffix(suffix) {
            if stripped.ends_with(|c: char| c.is_ascii_digit()) {
                out = stripped.to_string();
                break;
            }
        }
    }
    out
}

fn canonical_time(text: &str) -> String {
    let mut compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .collect::<String>()
        .to_uppercase();
    if !compact.contains(':') {
        if let Some(pos) = compact.find(|c: char| c.is_ascii_alphabetic()) {
            compact.insert_str(pos, ":00");
        }
    }
    compact.trim_start_matches('0').to_string()
}

/// Match a spoken time against the slots of `day`
pub fn match_slot(input: &str, day: Weekday) -> Option<&'static str> {
    let wanted = canonical_time(input);
    slots_for(day)
        .iter()
        .copied()
        .find(|slot| canonical_time(slot) == wanted)
}
