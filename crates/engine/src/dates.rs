//! Date and time parsing for coercion and the date rules.
//!
//! Accepts the formats submissions actually use (ISO 8601 / RFC 3339,
//! `Y-m-d H:i:s`, slashed and dotted day orders, bare times) plus the
//! keywords `now`, `today`, `tomorrow` and `yesterday`. Anything else is
//! unparsable: coercion passes it through and date rules reject it.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time};

/// Parse a date, time or date-time. Bare times take today's date.
pub fn parse_datetime(input: &str) -> Option<PrimitiveDateTime> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    let now = OffsetDateTime::now_utc();
    let today = now.date();
    match s.to_ascii_lowercase().as_str() {
        "now" => return Some(PrimitiveDateTime::new(today, now.time())),
        "today" => return Some(today.midnight()),
        "tomorrow" => return Some((today + Duration::days(1)).midnight()),
        "yesterday" => return Some((today - Duration::days(1)).midnight()),
        _ => {}
    }

    if let Ok(odt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(PrimitiveDateTime::new(odt.date(), odt.time()));
    }

    let datetime_formats = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ];
    for fmt in datetime_formats {
        if let Ok(dt) = PrimitiveDateTime::parse(s, fmt) {
            return Some(dt);
        }
    }

    let date_formats = [
        format_description!("[year]-[month]-[day]"),
        format_description!("[year]/[month]/[day]"),
        format_description!("[month]/[day]/[year]"),
        format_description!("[day].[month].[year]"),
        format_description!("[day]-[month]-[year]"),
    ];
    for fmt in date_formats {
        if let Ok(d) = Date::parse(s, fmt) {
            return Some(d.midnight());
        }
    }

    let time_formats = [
        format_description!("[hour]:[minute]:[second]"),
        format_description!("[hour]:[minute]"),
    ];
    for fmt in time_formats {
        if let Ok(t) = Time::parse(s, fmt) {
            return Some(PrimitiveDateTime::new(today, t));
        }
    }

    None
}

pub fn format_date(dt: &PrimitiveDateTime) -> String {
    format!("{:04}-{:02}-{:02}", dt.year(), u8::from(dt.month()), dt.day())
}

pub fn format_time(dt: &PrimitiveDateTime) -> String {
    format!("{:02}:{:02}:{:02}", dt.hour(), dt.minute(), dt.second())
}

/// `Y-m-d H:i:s`.
pub fn format_datetime(dt: &PrimitiveDateTime) -> String {
    format!("{} {}", format_date(dt), format_time(dt))
}

// ── PHP-style date_format patterns ──────────────────────────────────────────

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Default)]
struct Parts {
    year: Option<i32>,
    month: Option<u8>,
    day: Option<u8>,
    hour: Option<u8>,
    minute: Option<u8>,
    second: Option<u8>,
    pm: Option<bool>,
}

/// Whether `value` is exactly what formatting its own parse with `pattern`
/// produces. Pattern letters: `d j m n Y y H G h g i s A a M F D l`;
/// `\` escapes, every other character is literal.
pub fn matches_php_format(value: &str, pattern: &str) -> bool {
    let Some(dt) = parse_php_format(value, pattern) else {
        return false;
    };
    format_php(&dt, pattern) == value
}

fn parse_php_format(value: &str, pattern: &str) -> Option<PrimitiveDateTime> {
    let mut parts = Parts::default();
    let mut rest = value;
    let mut tokens = pattern.chars();

    while let Some(tok) = tokens.next() {
        match tok {
            'd' | 'm' | 'H' | 'h' | 'i' | 's' => {
                let (n, r) = take_digits(rest, 2, 2)?;
                rest = r;
                assign(&mut parts, tok, n)?;
            }
            'j' | 'n' | 'G' | 'g' => {
                let (n, r) = take_digits(rest, 1, 2)?;
                rest = r;
                assign(&mut parts, tok, n)?;
            }
            'Y' => {
                let (n, r) = take_digits(rest, 4, 4)?;
                rest = r;
                parts.year = Some(i32::try_from(n).ok()?);
            }
            'y' => {
                let (n, r) = take_digits(rest, 2, 2)?;
                rest = r;
                let n = i32::try_from(n).ok()?;
                parts.year = Some(if n < 70 { 2000 + n } else { 1900 + n });
            }
            'A' | 'a' => {
                let head = rest.get(..2)?;
                parts.pm = match head.to_ascii_lowercase().as_str() {
                    "am" => Some(false),
                    "pm" => Some(true),
                    _ => return None,
                };
                rest = &rest[2..];
            }
            'M' | 'F' => {
                let (idx, r) = take_name(rest, &MONTH_NAMES, tok == 'M')?;
                rest = r;
                parts.month = Some(u8::try_from(idx + 1).ok()?);
            }
            'D' | 'l' => {
                let (_, r) = take_name(rest, &DAY_NAMES, tok == 'D')?;
                rest = r;
            }
            '\\' => {
                let lit = tokens.next()?;
                rest = rest.strip_prefix(lit)?;
            }
            lit => {
                rest = rest.strip_prefix(lit)?;
            }
        }
    }
    if !rest.is_empty() {
        return None;
    }

    let mut hour = parts.hour.unwrap_or(0);
    if let Some(pm) = parts.pm {
        if hour == 0 || hour > 12 {
            return None;
        }
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }
    let month = Month::try_from(parts.month.unwrap_or(1)).ok()?;
    let date = Date::from_calendar_date(parts.year.unwrap_or(1970), month, parts.day.unwrap_or(1))
        .ok()?;
    let time = Time::from_hms(hour, parts.minute.unwrap_or(0), parts.second.unwrap_or(0)).ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

fn assign(parts: &mut Parts, tok: char, n: u32) -> Option<()> {
    let n = u8::try_from(n).ok()?;
    match tok {
        'd' | 'j' => parts.day = Some(n),
        'm' | 'n' => parts.month = Some(n),
        'H' | 'G' | 'h' | 'g' => parts.hour = Some(n),
        'i' => parts.minute = Some(n),
        's' => parts.second = Some(n),
        _ => return None,
    }
    Some(())
}

fn take_digits(s: &str, min: usize, max: usize) -> Option<(u32, &str)> {
    let len = s
        .bytes()
        .take(max)
        .take_while(|b| b.is_ascii_digit())
        .count();
    if len < min {
        return None;
    }
    Some((s[..len].parse().ok()?, &s[len..]))
}

fn take_name<'a>(s: &'a str, names: &[&str], short: bool) -> Option<(usize, &'a str)> {
    names.iter().enumerate().find_map(|(i, &name)| {
        let want: &str = if short { &name[..3] } else { name };
        s.starts_with(want).then(|| (i, &s[want.len()..]))
    })
}

fn format_php(dt: &PrimitiveDateTime, pattern: &str) -> String {
    let mut out = String::new();
    let mut tokens = pattern.chars();
    let hour12 = match dt.hour() % 12 {
        0 => 12,
        h => h,
    };
    let month_idx = usize::from(u8::from(dt.month())) - 1;
    let weekday_idx = usize::from(dt.weekday().number_days_from_monday());

    while let Some(tok) = tokens.next() {
        match tok {
            'd' => out.push_str(&format!("{:02}", dt.day())),
            'j' => out.push_str(&dt.day().to_string()),
            'm' => out.push_str(&format!("{:02}", u8::from(dt.month()))),
            'n' => out.push_str(&u8::from(dt.month()).to_string()),
            'Y' => out.push_str(&format!("{:04}", dt.year())),
            'y' => out.push_str(&format!("{:02}", dt.year().rem_euclid(100))),
            'H' => out.push_str(&format!("{:02}", dt.hour())),
            'G' => out.push_str(&dt.hour().to_string()),
            'h' => out.push_str(&format!("{:02}", hour12)),
            'g' => out.push_str(&hour12.to_string()),
            'i' => out.push_str(&format!("{:02}", dt.minute())),
            's' => out.push_str(&format!("{:02}", dt.second())),
            'A' => out.push_str(if dt.hour() < 12 { "AM" } else { "PM" }),
            'a' => out.push_str(if dt.hour() < 12 { "am" } else { "pm" }),
            'M' => out.push_str(&MONTH_NAMES[month_idx][..3]),
            'F' => out.push_str(MONTH_NAMES[month_idx]),
            'D' => out.push_str(&DAY_NAMES[weekday_idx][..3]),
            'l' => out.push_str(DAY_NAMES[weekday_idx]),
            '\\' => {
                if let Some(lit) = tokens.next() {
                    out.push(lit);
                }
            }
            lit => out.push(lit),
        }
    }
    out
}
