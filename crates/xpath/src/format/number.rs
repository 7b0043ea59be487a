//! `format-number` pictures and the decimal-format symbol model.
//!
//! A picture holds at most two sub-pictures separated by the pattern
//! separator; each is validated (one decimal separator, one percent or
//! per-mille but not both, at least one digit placeholder, active
//! characters contiguous) before formatting. The custom minus sign applies
//! only when the default negative prefix is used, never when the picture
//! supplies a negative sub-picture.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::XPathError;

/// The symbol set of one `xsl:decimal-format` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct DecimalFormat {
    pub decimal_separator: char,
    pub grouping_separator: char,
    pub minus_sign: char,
    pub percent: char,
    pub per_mille: char,
    /// First of the zero-digit family; the family covers the next nine
    /// codepoints.
    pub zero_digit: char,
    pub digit: char,
    pub pattern_separator: char,
    pub infinity: String,
    pub nan: String,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: ',',
            minus_sign: '-',
            percent: '%',
            per_mille: '‰',
            zero_digit: '0',
            digit: '#',
            pattern_separator: ';',
            infinity: "Infinity".to_string(),
            nan: "NaN".to_string(),
        }
    }
}

impl DecimalFormat {
    fn is_zero_family(&self, c: char) -> bool {
        let zero = self.zero_digit as u32;
        (zero..zero + 10).contains(&(c as u32))
    }

    fn is_active(&self, c: char) -> bool {
        self.is_zero_family(c)
            || c == self.digit
            || c == self.decimal_separator
            || c == self.grouping_separator
    }

    /// Maps an ASCII digit into the zero-digit family.
    fn map_digit(&self, c: char) -> char {
        char::from_u32(self.zero_digit as u32 + (c as u32 - '0' as u32)).unwrap_or(c)
    }
}

#[derive(Debug)]
struct SubPicture {
    prefix: String,
    suffix: String,
    min_int: usize,
    min_frac: usize,
    max_frac: usize,
    /// Grouping-separator positions counted in digits from the decimal
    /// point; a single entry means regular grouping at that interval.
    groups: Vec<usize>,
    multiplier: i64,
}

fn invalid(picture: &str, message: impl Into<String>) -> XPathError {
    XPathError::InvalidPicture {
        picture: picture.to_string(),
        message: message.into(),
    }
}

fn analyze(sub: &str, format: &DecimalFormat, picture: &str) -> Result<SubPicture, XPathError> {
    // strip quoted literals into passive characters first
    let mut chars: Vec<(char, bool)> = Vec::new(); // (char, quoted)
    let mut in_quote = false;
    for c in sub.chars() {
        if c == '\'' {
            in_quote = !in_quote;
            continue;
        }
        chars.push((c, in_quote));
    }
    if in_quote {
        return Err(invalid(picture, "unterminated quoted literal"));
    }

    let active_at: Vec<bool> = chars
        .iter()
        .map(|(c, quoted)| !quoted && format.is_active(*c))
        .collect();
    let first_active = active_at.iter().position(|a| *a);
    let last_active = active_at.iter().rposition(|a| *a);
    let (first_active, last_active) = match (first_active, last_active) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(invalid(picture, "no digit placeholder")),
    };
    // active characters must be contiguous
    if active_at[first_active..=last_active].iter().any(|a| !a) {
        return Err(invalid(
            picture,
            "digits and placeholders separated by passive characters",
        ));
    }

    let mut percent_count = 0;
    let mut per_mille_count = 0;
    for (c, quoted) in &chars {
        if *quoted {
            continue;
        }
        if *c == format.percent {
            percent_count += 1;
        }
        if *c == format.per_mille {
            per_mille_count += 1;
        }
    }
    if percent_count > 1 || per_mille_count > 1 || (percent_count > 0 && per_mille_count > 0) {
        return Err(invalid(picture, "bad percent / per-mille usage"));
    }

    let prefix: String = chars[..first_active].iter().map(|(c, _)| *c).collect();
    let suffix: String = chars[last_active + 1..].iter().map(|(c, _)| *c).collect();
    let body: Vec<char> = chars[first_active..=last_active]
        .iter()
        .map(|(c, _)| *c)
        .collect();

    let decimal_positions: Vec<usize> = body
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == format.decimal_separator)
        .map(|(i, _)| i)
        .collect();
    if decimal_positions.len() > 1 {
        return Err(invalid(picture, "more than one decimal separator"));
    }
    let (int_part, frac_part) = match decimal_positions.first() {
        Some(&pos) => (&body[..pos], &body[pos + 1..]),
        None => (&body[..], &[][..]),
    };

    if !body
        .iter()
        .any(|c| format.is_zero_family(*c) || *c == format.digit)
    {
        return Err(invalid(picture, "no digit placeholder"));
    }

    let min_int = int_part.iter().filter(|c| format.is_zero_family(**c)).count();
    let min_frac = frac_part.iter().filter(|c| format.is_zero_family(**c)).count();
    let max_frac = frac_part
        .iter()
        .filter(|c| format.is_zero_family(**c) || **c == format.digit)
        .count();

    // grouping positions measured in digit placeholders from the right
    let mut groups = Vec::new();
    let mut digits_seen = 0usize;
    for c in int_part.iter().rev() {
        if format.is_zero_family(*c) || *c == format.digit {
            digits_seen += 1;
        } else if *c == format.grouping_separator {
            groups.push(digits_seen);
        }
    }

    let multiplier = if percent_count > 0 {
        100
    } else if per_mille_count > 0 {
        1000
    } else {
        1
    };

    Ok(SubPicture {
        prefix,
        suffix,
        min_int,
        min_frac,
        max_frac,
        groups,
        multiplier,
    })
}

pub fn format_number(
    value: f64,
    picture: &str,
    format: &DecimalFormat,
) -> Result<String, XPathError> {
    let subs: Vec<&str> = picture.split(format.pattern_separator).collect();
    if subs.len() > 2 || subs.iter().any(|s| s.is_empty()) {
        return Err(invalid(picture, "bad sub-picture structure"));
    }
    let positive = analyze(subs[0], format, picture)?;
    let negative = subs
        .get(1)
        .map(|sub| analyze(sub, format, picture))
        .transpose()?;

    if value.is_nan() {
        return Ok(format.nan.clone());
    }

    let is_negative = value < 0.0 || (value == 0.0 && value.is_sign_negative());
    let (sub, default_minus) = match (&negative, is_negative) {
        (Some(negative_sub), true) => (negative_sub, false),
        (_, true) => (&positive, true),
        _ => (&positive, false),
    };

    if value.is_infinite() {
        let mut out = String::new();
        out.push_str(&sub.prefix);
        if default_minus {
            out.push(format.minus_sign);
        }
        out.push_str(&format.infinity);
        out.push_str(&sub.suffix);
        return Ok(out);
    }

    let scaled = value.abs() * sub.multiplier as f64;
    let digits = decimal_digits(scaled, sub.max_frac);
    let (int_digits, frac_digits) = digits;

    let mut int_digits = int_digits;
    while int_digits.len() < sub.min_int.max(1) {
        int_digits.insert(0, '0');
    }
    let mut frac_digits = frac_digits;
    while frac_digits.len() < sub.min_frac {
        frac_digits.push('0');
    }
    while frac_digits.len() > sub.min_frac && frac_digits.ends_with('0') {
        frac_digits.pop();
    }

    let mut out = String::new();
    out.push_str(&sub.prefix);
    // the custom minus sign applies only to the default negative prefix
    if default_minus {
        out.push(format.minus_sign);
    }
    out.push_str(&group_digits(&int_digits, &sub.groups, format));
    if !frac_digits.is_empty() {
        out.push(format.decimal_separator);
        for c in frac_digits.chars() {
            out.push(format.map_digit(c));
        }
    }
    out.push_str(&sub.suffix);
    Ok(out)
}

/// Rounded digit strings for the integer and fractional parts.
fn decimal_digits(value: f64, max_frac: usize) -> (String, String) {
    let rounded = match Decimal::try_from(value) {
        Ok(d) => d.round_dp_with_strategy(max_frac as u32, RoundingStrategy::MidpointNearestEven),
        Err(_) => {
            let text = format!("{:.*}", max_frac, value);
            return match text.split_once('.') {
                Some((int_part, frac_part)) => (int_part.to_string(), frac_part.to_string()),
                None => (text, String::new()),
            };
        }
    };
    let text = rounded.normalize().to_string();
    match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part.to_string(), frac_part.to_string()),
        None => (text, String::new()),
    }
}

fn group_digits(digits: &str, groups: &[usize], format: &DecimalFormat) -> String {
    let insert_at = |index_from_right: usize| -> bool {
        if groups.is_empty() || index_from_right == 0 {
            return false;
        }
        if groups.len() == 1 {
            // regular grouping at a fixed interval
            groups[0] > 0 && index_from_right % groups[0] == 0
        } else {
            groups.contains(&index_from_right)
        }
    };
    let count = digits.chars().count();
    let mut out = String::new();
    for (index, c) in digits.chars().enumerate() {
        let from_right = count - index;
        if index > 0 && insert_at(from_right) {
            out.push(format.grouping_separator);
        }
        out.push(format.map_digit(c));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_fmt(value: f64, picture: &str) -> String {
        format_number(value, picture, &DecimalFormat::default()).unwrap()
    }

    #[test]
    fn basic_patterns() {
        assert_eq!(default_fmt(1234.5, "#,##0.00"), "1,234.50");
        assert_eq!(default_fmt(1234.567, "#,##0"), "1,235");
        assert_eq!(default_fmt(0.5, "0.0"), "0.5");
        assert_eq!(default_fmt(-3.0, "0"), "-3");
    }

    #[test]
    fn percent_and_per_mille_multiply() {
        assert_eq!(default_fmt(0.25, "0%"), "25%");
        assert_eq!(default_fmt(0.025, "0‰"), "25‰");
    }

    #[test]
    fn custom_symbols_and_negative_sub_picture() {
        let format = DecimalFormat {
            decimal_separator: ',',
            grouping_separator: '.',
            ..DecimalFormat::default()
        };
        let out = format_number(-1234.5, "#.##0,00;(#.##0,00)", &format).unwrap();
        assert_eq!(out, "(1.234,50)");
        // the custom minus sign only applies without a negative sub-picture
        let minus = DecimalFormat {
            minus_sign: '~',
            ..DecimalFormat::default()
        };
        assert_eq!(format_number(-5.0, "0", &minus).unwrap(), "~5");
        assert_eq!(format_number(-5.0, "0;(0)", &minus).unwrap(), "(5)");
    }

    #[test]
    fn nan_and_infinity_strings() {
        let format = DecimalFormat {
            nan: "not-a-number".to_string(),
            infinity: "huge".to_string(),
            ..DecimalFormat::default()
        };
        assert_eq!(format_number(f64::NAN, "0", &format).unwrap(), "not-a-number");
        assert_eq!(format_number(f64::INFINITY, "0", &format).unwrap(), "huge");
        assert_eq!(format_number(f64::NEG_INFINITY, "0", &format).unwrap(), "-huge");
    }

    #[test]
    fn zero_digit_family_mapping() {
        let format = DecimalFormat {
            zero_digit: '٠', // Arabic-Indic zero
            ..DecimalFormat::default()
        };
        let out = format_number(42.0, "٠٠٠", &format).unwrap();
        assert_eq!(out, "٠٤٢");
    }

    #[test]
    fn picture_validation() {
        let check = |picture: &str| {
            format_number(1.0, picture, &DecimalFormat::default()).unwrap_err().code().to_string()
        };
        // three sub-pictures
        assert_eq!(check("0;0;0"), "FODF1310");
        // two decimal separators
        assert_eq!(check("0.0.0"), "FODF1310");
        // percent and per-mille together
        assert_eq!(check("0%‰"), "FODF1310");
        // no digit placeholder
        assert_eq!(check("'text'"), "FODF1310");
        // passive char between digits
        assert_eq!(check("0x0"), "FODF1310");
    }

    #[test]
    fn quoted_literals_are_passive() {
        assert_eq!(default_fmt(7.0, "'#'0"), "#7");
    }

    #[test]
    fn irregular_grouping_positions() {
        assert_eq!(default_fmt(1234567.0, "##,##,##0"), "12,34,567");
    }
}
