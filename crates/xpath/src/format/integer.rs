//! `format-integer` pictures: decimal digit patterns with grouping,
//! Roman, alphabetic and word forms, with the `;o` ordinal modifier.

use crate::error::XPathError;
use crate::format::picture::{
    alphabetic, ordinal_suffix, roman, words, words_ordinal,
};

pub fn format_integer(value: i64, picture: &str) -> Result<String, XPathError> {
    let invalid = |message: &str| XPathError::InvalidPicture {
        picture: picture.to_string(),
        message: message.to_string(),
    };
    if picture.is_empty() {
        return Err(invalid("empty picture"));
    }
    // primary token, optionally followed by ';' and a format modifier
    let (primary, modifier) = match picture.split_once(';') {
        Some((primary, modifier)) => (primary, modifier),
        None => (picture, ""),
    };
    let ordinal = modifier.starts_with('o');

    let out = match primary {
        "A" => match alphabetic(value) {
            Some(text) => text.to_uppercase(),
            None => value.to_string(),
        },
        "a" => alphabetic(value).unwrap_or_else(|| value.to_string()),
        // out-of-range Roman falls back to decimal
        "I" => roman(value).unwrap_or_else(|| value.to_string()),
        "i" => roman(value)
            .map(|text| text.to_lowercase())
            .unwrap_or_else(|| value.to_string()),
        "W" => {
            if ordinal {
                words_ordinal(value).to_uppercase()
            } else {
                words(value).to_uppercase()
            }
        }
        "w" => {
            if ordinal {
                words_ordinal(value)
            } else {
                words(value)
            }
        }
        "Ww" => {
            let text = if ordinal { words_ordinal(value) } else { words(value) };
            let mut chars = text.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().to_string() + chars.as_str(),
                None => text,
            }
        }
        _ => {
            if !primary.chars().all(|c| c.is_ascii_digit() || c == '#' || c == ',') {
                return Err(invalid("unrecognized primary format token"));
            }
            let formatted = grouped_decimal(value, primary).ok_or_else(|| {
                invalid("digit pattern must contain a digit placeholder")
            })?;
            if ordinal {
                format!("{}{}", formatted, ordinal_suffix(value))
            } else {
                formatted
            }
        }
    };
    Ok(out)
}

/// Formats against a `#,##0`-style pattern: mandatory-digit count from the
/// `0`-digits, group size from the separator positions.
fn grouped_decimal(value: i64, pattern: &str) -> Option<String> {
    let mut min_digits = 0usize;
    let mut group_size = None;
    let mut run = 0usize;
    let mut saw_placeholder = false;
    for c in pattern.chars().rev() {
        match c {
            '0'..='9' => {
                min_digits += 1;
                run += 1;
                saw_placeholder = true;
            }
            '#' => {
                run += 1;
                saw_placeholder = true;
            }
            ',' => {
                group_size.get_or_insert(run);
                run = 0;
            }
            _ => return None,
        }
    }
    if !saw_placeholder {
        return None;
    }

    let mut digits: Vec<char> = value.abs().to_string().chars().collect();
    while digits.len() < min_digits {
        digits.insert(0, '0');
    }
    let grouped = match group_size.filter(|size| *size > 0) {
        None => digits.into_iter().collect::<String>(),
        Some(size) => {
            let mut out = Vec::new();
            for (index, digit) in digits.iter().rev().enumerate() {
                if index > 0 && index % size == 0 {
                    out.push(',');
                }
                out.push(*digit);
            }
            out.into_iter().rev().collect()
        }
    };
    Some(if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_patterns_pad_and_group() {
        assert_eq!(format_integer(7, "1").unwrap(), "7");
        assert_eq!(format_integer(7, "001").unwrap(), "007");
        assert_eq!(format_integer(1234567, "#,###").unwrap(), "1,234,567");
        assert_eq!(format_integer(-42, "0000").unwrap(), "-0042");
    }

    #[test]
    fn letter_and_roman_forms() {
        assert_eq!(format_integer(3, "A").unwrap(), "C");
        assert_eq!(format_integer(28, "a").unwrap(), "ab");
        assert_eq!(format_integer(1999, "I").unwrap(), "MCMXCIX");
        assert_eq!(format_integer(12, "i").unwrap(), "xii");
        // out-of-range Roman falls back to decimal
        assert_eq!(format_integer(4000, "I").unwrap(), "4000");
    }

    #[test]
    fn word_forms_and_ordinals() {
        assert_eq!(format_integer(21, "w").unwrap(), "twenty-one");
        assert_eq!(format_integer(21, "Ww").unwrap(), "Twenty-one");
        assert_eq!(format_integer(3, "w;o").unwrap(), "third");
        assert_eq!(format_integer(2, "1;o").unwrap(), "2nd");
    }

    #[test]
    fn bad_pictures_are_rejected() {
        assert_eq!(
            format_integer(1, "").unwrap_err().code(),
            "FODF1310"
        );
        assert_eq!(format_integer(1, "x").unwrap_err().code(), "FODF1310");
        assert_eq!(format_integer(1, ",").unwrap_err().code(), "FODF1310");
    }
}
