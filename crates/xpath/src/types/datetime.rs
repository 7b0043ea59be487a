//! Calendar and duration values.
//!
//! Lexical forms follow XML Schema: optional components stay absent, seconds
//! are exact decimals, and a timezone is an optional offset in minutes.
//! Values with and without a timezone are distinct; comparisons impute the
//! implicit timezone at the comparison site, not at construction.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::XPathError;

static DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(-?\d{4,})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2}(?:\.\d+)?)(Z|[+-]\d{2}:\d{2})?$",
    )
    .expect("BUG: invalid DATETIME_RE regex literal")
});

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d{4,})-(\d{2})-(\d{2})(Z|[+-]\d{2}:\d{2})?$")
        .expect("BUG: invalid DATE_RE regex literal")
});

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}):(\d{2}):(\d{2}(?:\.\d+)?)(Z|[+-]\d{2}:\d{2})?$")
        .expect("BUG: invalid TIME_RE regex literal")
});

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("BUG: invalid DURATION_RE regex literal")
});

static GYEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d{4,})(Z|[+-]\d{2}:\d{2})?$").expect("BUG: invalid GYEAR_RE regex literal")
});

static GYEARMONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d{4,})-(\d{2})(Z|[+-]\d{2}:\d{2})?$")
        .expect("BUG: invalid GYEARMONTH_RE regex literal")
});

static GMONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^--(\d{2})(Z|[+-]\d{2}:\d{2})?$").expect("BUG: invalid GMONTH_RE regex literal")
});

static GMONTHDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^--(\d{2})-(\d{2})(Z|[+-]\d{2}:\d{2})?$")
        .expect("BUG: invalid GMONTHDAY_RE regex literal")
});

static GDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^---(\d{2})(Z|[+-]\d{2}:\d{2})?$").expect("BUG: invalid GDAY_RE regex literal")
});

fn parse_tz(s: Option<&str>) -> Option<i32> {
    let s = s?;
    if s == "Z" {
        return Some(0);
    }
    let sign = if s.starts_with('-') { -1 } else { 1 };
    let hours: i32 = s[1..3].parse().ok()?;
    let minutes: i32 = s[4..6].parse().ok()?;
    Some(sign * (hours * 60 + minutes))
}

fn fmt_tz(tz: Option<i32>, out: &mut String) {
    if let Some(offset) = tz {
        if offset == 0 {
            out.push('Z');
        } else {
            let sign = if offset < 0 { '-' } else { '+' };
            let abs = offset.abs();
            out.push_str(&format!("{}{:02}:{:02}", sign, abs / 60, abs % 60));
        }
    }
}

fn fmt_second(second: &Decimal) -> String {
    let normalized = second.normalize();
    let text = normalized.to_string();
    match text.split_once('.') {
        Some((int, frac)) => format!("{:0>2}.{}", int, frac),
        None => format!("{:0>2}", text),
    }
}

fn invalid(kind: &str, value: &str) -> XPathError {
    XPathError::InvalidCastValue {
        value: value.to_string(),
        target: kind.to_string(),
    }
}

fn check_date(year: i32, month: u8, day: u8) -> bool {
    (1..=12).contains(&month) && day >= 1 && day <= days_in_month(year, month)
}

pub fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u64, day: u64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let doy = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe as i64 - 719468
}

/// Inverse of [`days_from_civil`].
fn civil_from_days(days: i64) -> (i64, u64, u64) {
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// ISO 8601 day of week, Monday = 1.
pub fn iso_day_of_week(year: i32, month: u8, day: u8) -> u32 {
    let days = days_from_civil(year as i64, month as u64, day as u64);
    (days.rem_euclid(7) + 3) as u32 % 7 + 1
}

pub fn day_of_year(year: i32, month: u8, day: u8) -> u32 {
    let mut doy = day as u32;
    for m in 1..month {
        doy += days_in_month(year, m) as u32;
    }
    doy
}

/// xs:dateTime
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateTimeValue {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: Decimal,
    pub tz: Option<i32>,
}

impl DateTimeValue {
    pub fn parse(s: &str) -> Result<Self, XPathError> {
        let caps = DATETIME_RE
            .captures(s.trim())
            .ok_or_else(|| invalid("xs:dateTime", s))?;
        let value = DateTimeValue {
            year: caps[1].parse().map_err(|_| invalid("xs:dateTime", s))?,
            month: caps[2].parse().unwrap(),
            day: caps[3].parse().unwrap(),
            hour: caps[4].parse().unwrap(),
            minute: caps[5].parse().unwrap(),
            second: caps[6].parse().map_err(|_| invalid("xs:dateTime", s))?,
            tz: parse_tz(caps.get(7).map(|m| m.as_str())),
        };
        let ok = check_date(value.year, value.month, value.day)
            && value.hour <= 24
            && value.minute < 60
            && value.second < Decimal::from(60);
        if ok { Ok(value) } else { Err(invalid("xs:dateTime", s)) }
    }

    pub fn date(&self) -> DateValue {
        DateValue {
            year: self.year,
            month: self.month,
            day: self.day,
            tz: self.tz,
        }
    }

    pub fn time(&self) -> TimeValue {
        TimeValue {
            hour: self.hour,
            minute: self.minute,
            second: self.second,
            tz: self.tz,
        }
    }

    /// Seconds since the epoch, imputing `implicit_tz` (minutes) when the
    /// value carries no timezone.
    pub fn epoch_seconds(&self, implicit_tz: i32) -> Decimal {
        let days = days_from_civil(self.year as i64, self.month as u64, self.day as u64);
        let offset = self.tz.unwrap_or(implicit_tz) as i64;
        Decimal::from(
            days * 86_400 + self.hour as i64 * 3_600 + self.minute as i64 * 60 - offset * 60,
        ) + self.second
    }

    /// Builds a value from seconds since the epoch, labelled with `tz`.
    pub fn from_epoch_seconds(seconds: i64, tz: Option<i32>) -> DateTimeValue {
        let shifted = seconds + i64::from(tz.unwrap_or(0)) * 60;
        let days = shifted.div_euclid(86_400);
        let rem = shifted.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);
        DateTimeValue {
            year: year as i32,
            month: month as u8,
            day: day as u8,
            hour: (rem / 3_600) as u8,
            minute: (rem % 3_600 / 60) as u8,
            second: Decimal::from(rem % 60),
            tz,
        }
    }

    /// Adds a duration: whole months first (day clamped to the target
    /// month), then exact seconds.
    pub fn add(&self, months: i64, seconds: Decimal) -> DateTimeValue {
        let total = self.year as i64 * 12 + (self.month as i64 - 1) + months;
        let year = total.div_euclid(12);
        let month = (total.rem_euclid(12) + 1) as u8;
        let day = self.day.min(days_in_month(year as i32, month));

        let base_days = days_from_civil(year, month as u64, day as u64);
        let carry = self.second + seconds;
        let mut whole = carry.trunc().to_i64().unwrap_or(0);
        let mut frac = carry - Decimal::from(whole);
        if frac < Decimal::ZERO {
            frac += Decimal::from(60);
            whole -= 60;
        }
        // fold whole seconds into the clock fields
        let mut clock =
            base_days * 86_400 + self.hour as i64 * 3_600 + self.minute as i64 * 60 + whole;
        let mut second_whole = clock.rem_euclid(60);
        clock -= second_whole;
        if frac >= Decimal::from(60) {
            frac -= Decimal::from(60);
            second_whole += 60;
            if second_whole >= 60 {
                second_whole -= 60;
                clock += 60;
            }
        }
        let minutes = clock / 60;
        let (days, rem_minutes) = (minutes.div_euclid(1_440), minutes.rem_euclid(1_440));
        let (y, m, d) = civil_from_days(days);
        DateTimeValue {
            year: y as i32,
            month: m as u8,
            day: d as u8,
            hour: (rem_minutes / 60) as u8,
            minute: (rem_minutes % 60) as u8,
            second: Decimal::from(second_whole) + frac,
            tz: self.tz,
        }
    }
}

impl fmt::Display for DateTimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            fmt_second(&self.second)
        );
        fmt_tz(self.tz, &mut out);
        write!(f, "{}", out)
    }
}

/// xs:date
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateValue {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub tz: Option<i32>,
}

impl DateValue {
    pub fn parse(s: &str) -> Result<Self, XPathError> {
        let caps = DATE_RE
            .captures(s.trim())
            .ok_or_else(|| invalid("xs:date", s))?;
        let value = DateValue {
            year: caps[1].parse().map_err(|_| invalid("xs:date", s))?,
            month: caps[2].parse().unwrap(),
            day: caps[3].parse().unwrap(),
            tz: parse_tz(caps.get(4).map(|m| m.as_str())),
        };
        if check_date(value.year, value.month, value.day) {
            Ok(value)
        } else {
            Err(invalid("xs:date", s))
        }
    }

    pub fn at_midnight(&self) -> DateTimeValue {
        DateTimeValue {
            year: self.year,
            month: self.month,
            day: self.day,
            hour: 0,
            minute: 0,
            second: Decimal::ZERO,
            tz: self.tz,
        }
    }

    pub fn epoch_seconds(&self, implicit_tz: i32) -> Decimal {
        self.at_midnight().epoch_seconds(implicit_tz)
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!("{:04}-{:02}-{:02}", self.year, self.month, self.day);
        fmt_tz(self.tz, &mut out);
        write!(f, "{}", out)
    }
}

/// xs:time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeValue {
    pub hour: u8,
    pub minute: u8,
    pub second: Decimal,
    pub tz: Option<i32>,
}

impl TimeValue {
    pub fn parse(s: &str) -> Result<Self, XPathError> {
        let caps = TIME_RE
            .captures(s.trim())
            .ok_or_else(|| invalid("xs:time", s))?;
        let value = TimeValue {
            hour: caps[1].parse().unwrap(),
            minute: caps[2].parse().unwrap(),
            second: caps[3].parse().map_err(|_| invalid("xs:time", s))?,
            tz: parse_tz(caps.get(4).map(|m| m.as_str())),
        };
        if value.hour <= 24 && value.minute < 60 && value.second < Decimal::from(60) {
            Ok(value)
        } else {
            Err(invalid("xs:time", s))
        }
    }

    pub fn epoch_seconds(&self, implicit_tz: i32) -> Decimal {
        let offset = self.tz.unwrap_or(implicit_tz) as i64;
        Decimal::from(self.hour as i64 * 3_600 + self.minute as i64 * 60 - offset * 60)
            + self.second
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!(
            "{:02}:{:02}:{}",
            self.hour,
            self.minute,
            fmt_second(&self.second)
        );
        fmt_tz(self.tz, &mut out);
        write!(f, "{}", out)
    }
}

/// The gYear/gYearMonth/gMonth/gMonthDay/gDay family shares one component
/// struct; the type tag lives on the atomic value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GCalendarValue {
    pub year: Option<i32>,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub tz: Option<i32>,
}

impl GCalendarValue {
    pub fn parse_g_year(s: &str) -> Result<Self, XPathError> {
        let caps = GYEAR_RE
            .captures(s.trim())
            .ok_or_else(|| invalid("xs:gYear", s))?;
        Ok(GCalendarValue {
            year: Some(caps[1].parse().map_err(|_| invalid("xs:gYear", s))?),
            month: None,
            day: None,
            tz: parse_tz(caps.get(2).map(|m| m.as_str())),
        })
    }

    pub fn parse_g_year_month(s: &str) -> Result<Self, XPathError> {
        let caps = GYEARMONTH_RE
            .captures(s.trim())
            .ok_or_else(|| invalid("xs:gYearMonth", s))?;
        let month: u8 = caps[2].parse().unwrap();
        if !(1..=12).contains(&month) {
            return Err(invalid("xs:gYearMonth", s));
        }
        Ok(GCalendarValue {
            year: Some(caps[1].parse().map_err(|_| invalid("xs:gYearMonth", s))?),
            month: Some(month),
            day: None,
            tz: parse_tz(caps.get(3).map(|m| m.as_str())),
        })
    }

    pub fn parse_g_month(s: &str) -> Result<Self, XPathError> {
        let caps = GMONTH_RE
            .captures(s.trim())
            .ok_or_else(|| invalid("xs:gMonth", s))?;
        let month: u8 = caps[1].parse().unwrap();
        if !(1..=12).contains(&month) {
            return Err(invalid("xs:gMonth", s));
        }
        Ok(GCalendarValue {
            year: None,
            month: Some(month),
            day: None,
            tz: parse_tz(caps.get(2).map(|m| m.as_str())),
        })
    }

    pub fn parse_g_month_day(s: &str) -> Result<Self, XPathError> {
        let caps = GMONTHDAY_RE
            .captures(s.trim())
            .ok_or_else(|| invalid("xs:gMonthDay", s))?;
        let month: u8 = caps[1].parse().unwrap();
        let day: u8 = caps[2].parse().unwrap();
        if !(1..=12).contains(&month) || day < 1 || day > days_in_month(2000, month) {
            return Err(invalid("xs:gMonthDay", s));
        }
        Ok(GCalendarValue {
            year: None,
            month: Some(month),
            day: Some(day),
            tz: parse_tz(caps.get(3).map(|m| m.as_str())),
        })
    }

    pub fn parse_g_day(s: &str) -> Result<Self, XPathError> {
        let caps = GDAY_RE
            .captures(s.trim())
            .ok_or_else(|| invalid("xs:gDay", s))?;
        let day: u8 = caps[1].parse().unwrap();
        if !(1..=31).contains(&day) {
            return Err(invalid("xs:gDay", s));
        }
        Ok(GCalendarValue {
            year: None,
            month: None,
            day: Some(day),
            tz: parse_tz(caps.get(2).map(|m| m.as_str())),
        })
    }
}

impl fmt::Display for GCalendarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        match (self.year, self.month, self.day) {
            (Some(y), Some(m), None) => out.push_str(&format!("{:04}-{:02}", y, m)),
            (Some(y), None, None) => out.push_str(&format!("{:04}", y)),
            (None, Some(m), Some(d)) => out.push_str(&format!("--{:02}-{:02}", m, d)),
            (None, Some(m), None) => out.push_str(&format!("--{:02}", m)),
            (None, None, Some(d)) => out.push_str(&format!("---{:02}", d)),
            _ => {}
        }
        fmt_tz(self.tz, &mut out);
        write!(f, "{}", out)
    }
}

/// Duration storage: sign, whole months, exact seconds. Full xs:duration
/// uses both fields; the two derived types zero the other field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DurationValue {
    pub negative: bool,
    pub months: u64,
    pub seconds: Decimal,
}

impl DurationValue {
    pub fn new(negative: bool, months: u64, seconds: Decimal) -> Self {
        let negative = negative && (months > 0 || !seconds.is_zero());
        Self {
            negative,
            months,
            seconds,
        }
    }

    pub fn parse(s: &str) -> Result<Self, XPathError> {
        let trimmed = s.trim();
        let caps = DURATION_RE
            .captures(trimmed)
            .ok_or_else(|| invalid("xs:duration", s))?;
        // "P" and "PT" alone denote nothing
        if caps.get(2).is_none()
            && caps.get(3).is_none()
            && caps.get(4).is_none()
            && caps.get(5).is_none()
            && caps.get(6).is_none()
            && caps.get(7).is_none()
        {
            return Err(invalid("xs:duration", s));
        }
        if trimmed.ends_with('T') {
            return Err(invalid("xs:duration", s));
        }
        let group = |i: usize| -> u64 {
            caps.get(i)
                .map(|m| m.as_str().parse().unwrap_or(0))
                .unwrap_or(0)
        };
        let months = group(2) * 12 + group(3);
        let mut seconds = Decimal::from(group(4) * 86_400 + group(5) * 3_600 + group(6) * 60);
        if let Some(m) = caps.get(7) {
            seconds += m
                .as_str()
                .parse::<Decimal>()
                .map_err(|_| invalid("xs:duration", s))?;
        }
        Ok(DurationValue::new(caps.get(1).is_some(), months, seconds))
    }

    /// Rejects day/time components (for xs:yearMonthDuration).
    pub fn parse_year_month(s: &str) -> Result<Self, XPathError> {
        let value = Self::parse(s)?;
        if value.seconds.is_zero() && !s.contains('D') && !s.contains('T') {
            Ok(value)
        } else {
            Err(invalid("xs:yearMonthDuration", s))
        }
    }

    /// Rejects year/month components (for xs:dayTimeDuration).
    pub fn parse_day_time(s: &str) -> Result<Self, XPathError> {
        let value = Self::parse(s)?;
        if value.months == 0 {
            Ok(value)
        } else {
            Err(invalid("xs:dayTimeDuration", s))
        }
    }

    pub fn from_months(months: i64) -> Self {
        DurationValue::new(months < 0, months.unsigned_abs(), Decimal::ZERO)
    }

    pub fn from_seconds(seconds: Decimal) -> Self {
        DurationValue::new(seconds < Decimal::ZERO, 0, seconds.abs())
    }

    pub fn signed_months(&self) -> i64 {
        let months = self.months as i64;
        if self.negative { -months } else { months }
    }

    pub fn signed_seconds(&self) -> Decimal {
        if self.negative { -self.seconds } else { self.seconds }
    }

    // component extractors; sign applies to every component
    pub fn years_component(&self) -> i64 {
        self.apply_sign((self.months / 12) as i64)
    }

    pub fn months_component(&self) -> i64 {
        self.apply_sign((self.months % 12) as i64)
    }

    pub fn days_component(&self) -> i64 {
        self.apply_sign(
            (self.seconds / Decimal::from(86_400))
                .trunc()
                .to_i64()
                .unwrap_or(0),
        )
    }

    pub fn hours_component(&self) -> i64 {
        let rem = self.seconds - Decimal::from(86_400) * (self.seconds / Decimal::from(86_400)).trunc();
        self.apply_sign((rem / Decimal::from(3_600)).trunc().to_i64().unwrap_or(0))
    }

    pub fn minutes_component(&self) -> i64 {
        let rem = self.seconds - Decimal::from(3_600) * (self.seconds / Decimal::from(3_600)).trunc();
        self.apply_sign((rem / Decimal::from(60)).trunc().to_i64().unwrap_or(0))
    }

    pub fn seconds_component(&self) -> Decimal {
        let rem = self.seconds - Decimal::from(60) * (self.seconds / Decimal::from(60)).trunc();
        if self.negative { -rem } else { rem }
    }

    fn apply_sign(&self, value: i64) -> i64 {
        if self.negative { -value } else { value }
    }
}

impl fmt::Display for DurationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months == 0 && self.seconds.is_zero() {
            return write!(f, "PT0S");
        }
        let mut out = String::new();
        if self.negative {
            out.push('-');
        }
        out.push('P');
        let years = self.months / 12;
        let months = self.months % 12;
        if years > 0 {
            out.push_str(&format!("{}Y", years));
        }
        if months > 0 {
            out.push_str(&format!("{}M", months));
        }
        let total = self.seconds;
        let days = (total / Decimal::from(86_400)).trunc().to_i64().unwrap_or(0);
        let rem = total - Decimal::from(days * 86_400);
        let hours = (rem / Decimal::from(3_600)).trunc().to_i64().unwrap_or(0);
        let rem = rem - Decimal::from(hours * 3_600);
        let minutes = (rem / Decimal::from(60)).trunc().to_i64().unwrap_or(0);
        let seconds = rem - Decimal::from(minutes * 60);
        if days > 0 {
            out.push_str(&format!("{}D", days));
        }
        if hours > 0 || minutes > 0 || !seconds.is_zero() {
            out.push('T');
            if hours > 0 {
                out.push_str(&format!("{}H", hours));
            }
            if minutes > 0 {
                out.push_str(&format!("{}M", minutes));
            }
            if !seconds.is_zero() {
                out.push_str(&format!("{}S", seconds.normalize()));
            }
        }
        write!(f, "{}", out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_round_trips() {
        let dt = DateTimeValue::parse("2024-07-09T08:05:03Z").unwrap();
        assert_eq!(dt.to_string(), "2024-07-09T08:05:03Z");
        let dt = DateTimeValue::parse("2024-07-09T08:05:03.25-05:30").unwrap();
        assert_eq!(dt.to_string(), "2024-07-09T08:05:03.25-05:30");
        assert_eq!(dt.tz, Some(-330));
    }

    #[test]
    fn datetime_rejects_bad_dates() {
        assert!(DateTimeValue::parse("2023-02-29T00:00:00").is_err());
        assert!(DateTimeValue::parse("2024-13-01T00:00:00").is_err());
        assert!(DateTimeValue::parse("not-a-date").is_err());
    }

    #[test]
    fn absent_timezone_is_distinct() {
        let naive = DateTimeValue::parse("2024-01-01T00:00:00").unwrap();
        let utc = DateTimeValue::parse("2024-01-01T00:00:00Z").unwrap();
        assert_ne!(naive, utc);
        // with an implicit timezone of zero they compare equal
        assert_eq!(naive.epoch_seconds(0), utc.epoch_seconds(0));
    }

    #[test]
    fn epoch_ordering_imputes_implicit_timezone() {
        let early = DateTimeValue::parse("2024-01-01T00:00:00+02:00").unwrap();
        let late = DateTimeValue::parse("2024-01-01T01:00:00+02:00").unwrap();
        assert!(early.epoch_seconds(0) < late.epoch_seconds(0));
    }

    #[test]
    fn add_months_clamps_day() {
        let dt = DateTimeValue::parse("2024-01-31T12:00:00").unwrap();
        let next = dt.add(1, Decimal::ZERO);
        assert_eq!((next.year, next.month, next.day), (2024, 2, 29));
    }

    #[test]
    fn add_seconds_carries_into_days() {
        let dt = DateTimeValue::parse("2024-12-31T23:59:30").unwrap();
        let next = dt.add(0, Decimal::from(45));
        assert_eq!(next.to_string(), "2025-01-01T00:00:15");
    }

    #[test]
    fn duration_parse_and_canonical_form() {
        let d = DurationValue::parse("P1Y2M3DT4H5M6.5S").unwrap();
        assert_eq!(d.months, 14);
        assert_eq!(d.to_string(), "P1Y2M3DT4H5M6.5S");
        assert_eq!(DurationValue::parse("PT0S").unwrap().to_string(), "PT0S");
        assert_eq!(DurationValue::parse("-P1D").unwrap().to_string(), "-P1D");
    }

    #[test]
    fn duration_rejects_empty_designators() {
        assert!(DurationValue::parse("P").is_err());
        assert!(DurationValue::parse("PT").is_err());
        assert!(DurationValue::parse("1Y").is_err());
    }

    #[test]
    fn duration_components_respect_sign() {
        let d = DurationValue::parse("-P1Y2M3DT4H5M6S").unwrap();
        assert_eq!(d.years_component(), -1);
        assert_eq!(d.months_component(), -2);
        assert_eq!(d.days_component(), -3);
        assert_eq!(d.hours_component(), -4);
        assert_eq!(d.minutes_component(), -5);
        assert_eq!(d.seconds_component(), Decimal::from(-6));
    }

    #[test]
    fn subtype_parsers_reject_foreign_components() {
        assert!(DurationValue::parse_year_month("P1Y").is_ok());
        assert!(DurationValue::parse_year_month("P1D").is_err());
        assert!(DurationValue::parse_day_time("PT5M").is_ok());
        assert!(DurationValue::parse_day_time("P1M").is_err());
    }

    #[test]
    fn g_types_round_trip() {
        assert_eq!(
            GCalendarValue::parse_g_month_day("--07-09").unwrap().to_string(),
            "--07-09"
        );
        assert_eq!(
            GCalendarValue::parse_g_year("2024Z").unwrap().to_string(),
            "2024Z"
        );
        assert!(GCalendarValue::parse_g_month("--13").is_err());
    }

    #[test]
    fn day_of_week_and_year() {
        // 2024-07-09 is a Tuesday
        assert_eq!(iso_day_of_week(2024, 7, 9), 2);
        assert_eq!(day_of_year(2024, 1, 1), 1);
        assert_eq!(day_of_year(2024, 12, 31), 366);
    }
}
