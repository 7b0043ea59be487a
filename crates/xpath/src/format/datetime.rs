//! `format-dateTime`, `format-date` and `format-time` pictures.

use rust_decimal::prelude::ToPrimitive;

use crate::error::XPathError;
use crate::format::picture::{Component, Fragment, apply_width, parse_picture};
use crate::types::datetime::{DateTimeValue, DateValue, TimeValue, day_of_year, iso_day_of_week};

const MONTHS: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const DAYS: &[&str] = &[
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

fn invalid(picture: &str, message: impl Into<String>) -> XPathError {
    XPathError::InvalidPicture {
        picture: picture.to_string(),
        message: message.into(),
    }
}

pub fn format_date_time(value: &DateTimeValue, picture: &str) -> Result<String, XPathError> {
    render(value, picture, true, true)
}

pub fn format_date(value: &DateValue, picture: &str) -> Result<String, XPathError> {
    render(&value.at_midnight(), picture, true, false)
}

pub fn format_time(value: &TimeValue, picture: &str) -> Result<String, XPathError> {
    let carrier = DateTimeValue {
        year: 2000,
        month: 1,
        day: 1,
        hour: value.hour,
        minute: value.minute,
        second: value.second,
        tz: value.tz,
    };
    render(&carrier, picture, false, true)
}

fn render(
    value: &DateTimeValue,
    picture: &str,
    with_date: bool,
    with_time: bool,
) -> Result<String, XPathError> {
    let fragments = parse_picture(picture).map_err(|message| invalid(picture, message))?;
    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            Fragment::Literal(text) => out.push_str(&text),
            Fragment::Component(component) => {
                let date_specifier =
                    matches!(component.specifier, 'Y' | 'M' | 'D' | 'd' | 'F' | 'W' | 'w' | 'E');
                let time_specifier =
                    matches!(component.specifier, 'H' | 'h' | 'P' | 'm' | 's' | 'f');
                if (date_specifier && !with_date) || (time_specifier && !with_time) {
                    return Err(invalid(
                        picture,
                        format!(
                            "component [{}] does not apply to this value",
                            component.specifier
                        ),
                    ));
                }
                render_component(value, &component, picture, &mut out)?;
            }
        }
    }
    Ok(out)
}

fn render_component(
    value: &DateTimeValue,
    component: &Component,
    picture: &str,
    out: &mut String,
) -> Result<(), XPathError> {
    match component.specifier {
        'Y' => out.push_str(&component.format_numeric(value.year as i64)),
        'M' => {
            if component.wants_name() {
                out.push_str(&component.format_name(MONTHS[(value.month - 1) as usize]));
            } else {
                out.push_str(&component.format_numeric(value.month as i64));
            }
        }
        'D' => out.push_str(&component.format_numeric(value.day as i64)),
        'd' => out.push_str(
            &component.format_numeric(day_of_year(value.year, value.month, value.day) as i64),
        ),
        'F' => {
            let iso = iso_day_of_week(value.year, value.month, value.day);
            if component.wants_name() || component.presentation.is_empty() {
                let name = DAYS[(iso - 1) as usize];
                if component.presentation.is_empty() {
                    out.push_str(name);
                } else {
                    out.push_str(&component.format_name(name));
                }
            } else {
                // numeric day of week counts from Sunday = 1
                let sunday_first = (iso % 7) + 1;
                out.push_str(&component.format_numeric(sunday_first as i64));
            }
        }
        'W' => {
            let week = (day_of_year(value.year, value.month, value.day) as i64 - 1) / 7 + 1;
            out.push_str(&component.format_numeric(week));
        }
        'w' => {
            let week = (value.day as i64 - 1) / 7 + 1;
            out.push_str(&component.format_numeric(week));
        }
        'H' => out.push_str(&component.format_numeric(value.hour as i64)),
        'h' => {
            let hour = match value.hour % 12 {
                0 => 12,
                h => h,
            };
            out.push_str(&component.format_numeric(hour as i64));
        }
        'P' => {
            let marker = if value.hour < 12 { "am" } else { "pm" };
            let text = match component.presentation.as_str() {
                "N" => marker.to_uppercase(),
                "Nn" => {
                    let mut chars = marker.chars();
                    let first = chars.next().unwrap().to_uppercase().to_string();
                    format!("{}{}", first, chars.as_str())
                }
                _ => marker.to_string(),
            };
            out.push_str(&text);
        }
        'm' => out.push_str(&component.format_numeric(value.minute as i64)),
        's' => {
            let whole = value.second.trunc().to_i64().unwrap_or(0);
            out.push_str(&component.format_numeric(whole));
        }
        'f' => {
            let frac = value.second - value.second.trunc();
            // fractional digits without the leading "0."
            let digits = frac.normalize().to_string();
            let digits = digits.strip_prefix("0.").unwrap_or("").to_string();
            let min = component
                .digit_pattern_width()
                .or(component.min_width);
            out.push_str(&apply_fraction_width(digits, min, component.max_width));
        }
        'Z' | 'z' => {
            if component.specifier == 'z' {
                out.push_str("GMT");
            }
            match value.tz {
                None => {}
                Some(0) if component.specifier == 'Z' => out.push('Z'),
                Some(offset) => {
                    let sign = if offset < 0 { '-' } else { '+' };
                    out.push_str(&format!(
                        "{}{:02}:{:02}",
                        sign,
                        offset.abs() / 60,
                        offset.abs() % 60
                    ));
                }
            }
        }
        'E' => out.push_str(if value.year < 0 { "BC" } else { "AD" }),
        'C' => out.push_str("ISO"),
        other => {
            return Err(invalid(
                picture,
                format!("unknown component specifier '{}'", other),
            ));
        }
    }
    Ok(())
}

/// Fractional seconds: the minimum width zero-pads on the right, the
/// maximum truncates.
fn apply_fraction_width(digits: String, min: Option<usize>, max: Option<usize>) -> String {
    let mut out = digits;
    if let Some(max) = max {
        if out.len() > max {
            out.truncate(max);
        }
    }
    if let Some(min) = min {
        while out.len() < min {
            out.push('0');
        }
    }
    out
}
