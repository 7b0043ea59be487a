//! Shared picture-string machinery: numbering presentations (decimal
//! padding, Roman, alphabetic, English words, ordinal suffixes) and width
//! modifiers.

/// Roman numerals cover 1..=3999; outside that the caller falls back to
/// decimal.
pub fn roman(n: i64) -> Option<String> {
    if !(1..=3999).contains(&n) {
        return None;
    }
    const TABLE: &[(i64, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut rest = n;
    let mut out = String::new();
    for (value, digits) in TABLE {
        while rest >= *value {
            out.push_str(digits);
            rest -= value;
        }
    }
    Some(out)
}

/// a, b, …, z, aa, ab, … (bijective base 26); requires n ≥ 1.
pub fn alphabetic(n: i64) -> Option<String> {
    if n < 1 {
        return None;
    }
    let mut rest = n;
    let mut out = Vec::new();
    while rest > 0 {
        rest -= 1;
        out.push((b'a' + (rest % 26) as u8) as char);
        rest /= 26;
    }
    out.reverse();
    Some(out.into_iter().collect())
}

const ONES: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];
const TENS: &[&str] = &[
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];
const ONES_ORDINAL: &[&str] = &[
    "zeroth", "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth",
    "ninth", "tenth", "eleventh", "twelfth", "thirteenth", "fourteenth", "fifteenth",
    "sixteenth", "seventeenth", "eighteenth", "nineteenth",
];

/// English cardinal words.
pub fn words(n: i64) -> String {
    if n < 0 {
        return format!("minus {}", words(-n));
    }
    if n < 20 {
        return ONES[n as usize].to_string();
    }
    if n < 100 {
        let tens = TENS[(n / 10) as usize];
        return if n % 10 == 0 {
            tens.to_string()
        } else {
            format!("{}-{}", tens, ONES[(n % 10) as usize])
        };
    }
    for (scale, name) in [
        (1_000_000_000_000i64, "trillion"),
        (1_000_000_000, "billion"),
        (1_000_000, "million"),
        (1_000, "thousand"),
        (100, "hundred"),
    ] {
        if n >= scale {
            let head = format!("{} {}", words(n / scale), name);
            return if n % scale == 0 {
                head
            } else {
                format!("{} and {}", head, words(n % scale))
            };
        }
    }
    unreachable!("all magnitudes covered");
}

/// English ordinal words.
pub fn words_ordinal(n: i64) -> String {
    if n < 0 {
        return format!("minus {}", words_ordinal(-n));
    }
    if n < 20 {
        return ONES_ORDINAL[n as usize].to_string();
    }
    if n < 100 && n % 10 == 0 {
        let tens = TENS[(n / 10) as usize];
        return format!("{}th", tens.trim_end_matches('y').to_string() + if tens.ends_with('y') { "ie" } else { "" });
    }
    if n < 100 {
        return format!("{}-{}", TENS[(n / 10) as usize], ONES_ORDINAL[(n % 10) as usize]);
    }
    // hundred and up: cardinal head, ordinal tail
    for scale in [1_000_000_000_000i64, 1_000_000_000, 1_000_000, 1_000, 100] {
        if n >= scale {
            if n % scale == 0 {
                return format!("{}th", words(n));
            }
            return format!("{} and {}", words(n - n % scale), words_ordinal(n % scale));
        }
    }
    unreachable!("all magnitudes covered");
}

/// English ordinal suffix: st, nd, rd, th.
pub fn ordinal_suffix(n: i64) -> &'static str {
    let tens = (n.abs() / 10) % 10;
    if tens == 1 {
        return "th";
    }
    match n.abs() % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// Applies `[min]-[max]` width: zero- or space-pad to the minimum, truncate
/// to the maximum.
pub fn apply_width(
    text: String,
    min_width: Option<usize>,
    max_width: Option<usize>,
    numeric: bool,
) -> String {
    let mut out = text;
    if let Some(max) = max_width {
        if out.chars().count() > max {
            out = if numeric {
                // numeric truncation keeps the least significant end
                let skip = out.chars().count() - max;
                out.chars().skip(skip).collect()
            } else {
                out.chars().take(max).collect()
            };
        }
    }
    if let Some(min) = min_width {
        while out.chars().count() < min {
            if numeric {
                out.insert(0, '0');
            } else {
                out.push(' ');
            }
        }
    }
    out
}

/// One parsed `[…]` component of a date/time picture.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub specifier: char,
    /// Presentation modifier: `01`, `N`, `Nn`, `I`, `a`, `Ww`, … with a
    /// possible trailing `o` (ordinal) or `t` (traditional).
    pub presentation: String,
    pub min_width: Option<usize>,
    pub max_width: Option<usize>,
}

impl Component {
    pub fn ordinal(&self) -> bool {
        self.presentation.ends_with('o')
    }

    fn base_presentation(&self) -> &str {
        self.presentation
            .trim_end_matches(['o', 't', 'c'])
    }

    /// Minimum width implied by a digit-pattern presentation like `01`.
    pub fn digit_pattern_width(&self) -> Option<usize> {
        let base = self.base_presentation();
        if !base.is_empty() && base.chars().all(|c| c.is_ascii_digit()) {
            Some(base.chars().count())
        } else {
            None
        }
    }

    /// Formats a numeric component value under this presentation.
    pub fn format_numeric(&self, value: i64) -> String {
        let base = self.base_presentation();
        let mut text = match base {
            "I" => roman(value).unwrap_or_else(|| value.to_string()),
            "i" => roman(value)
                .map(|r| r.to_lowercase())
                .unwrap_or_else(|| value.to_string()),
            "A" => alphabetic(value)
                .map(|a| a.to_uppercase())
                .unwrap_or_else(|| value.to_string()),
            "a" => alphabetic(value).unwrap_or_else(|| value.to_string()),
            "W" => {
                if self.ordinal() {
                    words_ordinal(value).to_uppercase()
                } else {
                    words(value).to_uppercase()
                }
            }
            "w" => {
                if self.ordinal() {
                    words_ordinal(value)
                } else {
                    words(value)
                }
            }
            "Ww" => {
                let text = if self.ordinal() {
                    words_ordinal(value)
                } else {
                    words(value)
                };
                capitalize_words(&text)
            }
            _ => {
                let min = self.digit_pattern_width().or(self.min_width);
                let digits = apply_width(value.to_string(), min, self.max_width, true);
                if self.ordinal() {
                    format!("{}{}", digits, ordinal_suffix(value))
                } else {
                    digits
                }
            }
        };
        // an explicit width modifier still applies to non-decimal forms
        if !base.is_empty() && !base.chars().all(|c| c.is_ascii_digit()) {
            text = apply_width(text, self.min_width, self.max_width, false);
        }
        text
    }

    /// Formats a name-valued component (`N`, `n`, `Nn`).
    pub fn format_name(&self, name: &str) -> String {
        let base = self.base_presentation();
        let text = match base {
            "N" => name.to_uppercase(),
            "n" => name.to_lowercase(),
            _ => name.to_string(),
        };
        apply_width(text, self.min_width, self.max_width, false)
    }

    pub fn wants_name(&self) -> bool {
        matches!(self.base_presentation(), "N" | "n" | "Nn")
    }
}

fn capitalize_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start_of_word = true;
    for c in text.chars() {
        if start_of_word && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            start_of_word = false;
        } else {
            out.push(c);
            if !c.is_alphanumeric() && c != '\'' {
                start_of_word = true;
            }
        }
    }
    out
}

/// Parsed fragment of a picture: literal text or a component.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Literal(String),
    Component(Component),
}

/// Parses the shared `[component]` grammar with `[[` and `]]` literals.
pub fn parse_picture(picture: &str) -> Result<Vec<Fragment>, String> {
    let mut fragments = Vec::new();
    let mut literal = String::new();
    let mut chars = picture.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    literal.push('[');
                    continue;
                }
                if !literal.is_empty() {
                    fragments.push(Fragment::Literal(std::mem::take(&mut literal)));
                }
                let mut body = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    body.push(inner);
                }
                if !closed {
                    return Err("unterminated component".to_string());
                }
                fragments.push(Fragment::Component(parse_component(&body)?));
            }
            ']' => {
                if chars.peek() == Some(&']') {
                    chars.next();
                    literal.push(']');
                } else {
                    return Err("unmatched ']'".to_string());
                }
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        fragments.push(Fragment::Literal(literal));
    }
    Ok(fragments)
}

fn parse_component(body: &str) -> Result<Component, String> {
    let body = body.trim();
    let mut chars = body.chars();
    let specifier = chars.next().ok_or_else(|| "empty component".to_string())?;
    let rest: String = chars.collect();
    let (presentation, width) = match rest.split_once(',') {
        Some((presentation, width)) => (presentation.to_string(), Some(width)),
        None => (rest, None),
    };
    let (min_width, max_width) = match width {
        None => (None, None),
        Some(width) => parse_width(width)?,
    };
    Ok(Component {
        specifier,
        presentation,
        min_width,
        max_width,
    })
}

fn parse_width(width: &str) -> Result<(Option<usize>, Option<usize>), String> {
    let (min_text, max_text) = match width.split_once('-') {
        Some((min, max)) => (min, Some(max)),
        None => (width, None),
    };
    let parse_part = |part: &str| -> Result<Option<usize>, String> {
        match part.trim() {
            "*" | "" => Ok(None),
            digits => digits
                .parse()
                .map(Some)
                .map_err(|_| format!("bad width '{}'", width)),
        }
    };
    Ok((parse_part(min_text)?, max_text.map(parse_part).transpose()?.flatten()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roman_range_and_fallback() {
        assert_eq!(roman(2024).unwrap(), "MMXXIV");
        assert_eq!(roman(4), Some("IV".to_string()));
        assert!(roman(0).is_none());
        assert!(roman(4000).is_none());
    }

    #[test]
    fn alphabetic_is_bijective_base26() {
        assert_eq!(alphabetic(1).unwrap(), "a");
        assert_eq!(alphabetic(26).unwrap(), "z");
        assert_eq!(alphabetic(27).unwrap(), "aa");
        assert_eq!(alphabetic(52).unwrap(), "az");
        assert_eq!(alphabetic(703).unwrap(), "aaa");
    }

    #[test]
    fn english_words() {
        assert_eq!(words(21), "twenty-one");
        assert_eq!(words(105), "one hundred and five");
        assert_eq!(words(2000), "two thousand");
        assert_eq!(words_ordinal(1), "first");
        assert_eq!(words_ordinal(22), "twenty-second");
    }

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(ordinal_suffix(1), "st");
        assert_eq!(ordinal_suffix(2), "nd");
        assert_eq!(ordinal_suffix(3), "rd");
        assert_eq!(ordinal_suffix(4), "th");
        assert_eq!(ordinal_suffix(11), "th");
        assert_eq!(ordinal_suffix(12), "th");
        assert_eq!(ordinal_suffix(21), "st");
    }

    #[test]
    fn picture_parsing_handles_literal_brackets() {
        let fragments = parse_picture("[[Y]] [Y0001]").unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], Fragment::Literal("[Y] ".to_string()));
        match &fragments[1] {
            Fragment::Component(c) => {
                assert_eq!(c.specifier, 'Y');
                assert_eq!(c.digit_pattern_width(), Some(4));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn width_modifiers() {
        let fragments = parse_picture("[Y,2-2]").unwrap();
        match &fragments[0] {
            Fragment::Component(c) => {
                assert_eq!(c.min_width, Some(2));
                assert_eq!(c.max_width, Some(2));
                assert_eq!(c.format_numeric(2024), "24");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unterminated_component_is_an_error() {
        assert!(parse_picture("[Y").is_err());
        assert!(parse_picture("Y]").is_err());
    }
}
