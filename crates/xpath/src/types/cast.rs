//! Casting between atomic types: the engine behind `xs:NAME(value)`
//! constructors, `cast as`, and untyped-value coercion.
//!
//! Lexical rules follow XML Schema: `xs:boolean` accepts only
//! `true|false|1|0`, integers reject NaN and the infinities, `xs:float` and
//! `xs:double` accept `INF`/`-INF`/`+INF`/`NaN`, binary types validate
//! their alphabets, and the calendar family uses the ISO 8601 forms.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use stilo_xdm::{Namespaces, QName};

use crate::error::{Result, XPathError};
use crate::types::atomic::{
    AtomicType, AtomicValue, base64_decode, hex_decode, string_to_double,
};
use crate::types::datetime::{
    DateTimeValue, DateValue, DurationValue, GCalendarValue, TimeValue,
};

fn cast_err(value: &AtomicValue, target: AtomicType) -> XPathError {
    XPathError::InvalidCastValue {
        value: value.to_string_value(),
        target: target.name().to_string(),
    }
}

/// Casts an atomic value to a target type. `namespaces` is only consulted
/// for `xs:QName` casts of prefixed lexical names.
pub fn cast_atomic(
    value: &AtomicValue,
    target: AtomicType,
    namespaces: Option<&Namespaces>,
) -> Result<AtomicValue> {
    use AtomicType as T;
    use AtomicValue as V;

    // identity casts revalidate nothing
    if value.atomic_type() == target {
        return Ok(value.clone());
    }

    let lexical = || value.to_string_value();
    let lexical_trim = || value.to_string_value().trim().to_string();

    match target {
        T::AnyAtomic => Ok(value.clone()),
        T::String => Ok(V::String(lexical())),
        T::NormalizedString => Ok(V::String(
            lexical().replace(['\t', '\n', '\r'], " "),
        )),
        T::Token | T::Language | T::Name | T::NCName | T::Id | T::Idref => {
            let collapsed = lexical()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            Ok(V::String(collapsed))
        }
        T::UntypedAtomic => Ok(V::UntypedAtomic(lexical())),
        T::AnyUri => Ok(V::AnyUri(lexical_trim())),

        T::Boolean => match value {
            V::Boolean(b) => Ok(V::Boolean(*b)),
            V::Integer(i) => Ok(V::Boolean(*i != 0)),
            V::Decimal(d) => Ok(V::Boolean(!d.is_zero())),
            V::Double(d) => Ok(V::Boolean(*d != 0.0 && !d.is_nan())),
            V::String(_) | V::UntypedAtomic(_) | V::AnyUri(_) => {
                match lexical_trim().as_str() {
                    "true" | "1" => Ok(V::Boolean(true)),
                    "false" | "0" => Ok(V::Boolean(false)),
                    _ => Err(cast_err(value, target)),
                }
            }
            _ => Err(cast_err(value, target)),
        },

        T::Integer
        | T::NonNegativeInteger
        | T::PositiveInteger
        | T::NonPositiveInteger
        | T::NegativeInteger
        | T::Long
        | T::Int
        | T::Short
        | T::Byte
        | T::UnsignedLong
        | T::UnsignedInt
        | T::UnsignedShort
        | T::UnsignedByte => {
            let n = cast_to_integer(value).ok_or_else(|| cast_err(value, target))?;
            if integer_in_range(n, target) {
                Ok(V::Integer(n))
            } else {
                Err(cast_err(value, target))
            }
        }

        T::Decimal => match value {
            V::Integer(i) => Ok(V::Decimal(Decimal::from(*i))),
            V::Double(d) => {
                if d.is_nan() || d.is_infinite() {
                    Err(cast_err(value, target))
                } else {
                    Decimal::try_from(*d)
                        .map(V::Decimal)
                        .map_err(|_| cast_err(value, target))
                }
            }
            V::Boolean(b) => Ok(V::Decimal(Decimal::from(u8::from(*b)))),
            V::String(_) | V::UntypedAtomic(_) | V::AnyUri(_) => lexical_trim()
                .parse::<Decimal>()
                .map(V::Decimal)
                .map_err(|_| cast_err(value, target)),
            _ => Err(cast_err(value, target)),
        },

        T::Double | T::Float => match value {
            V::Integer(_) | V::Decimal(_) => Ok(V::Double(value.to_double())),
            V::Boolean(b) => Ok(V::Double(f64::from(u8::from(*b)))),
            V::String(_) | V::UntypedAtomic(_) | V::AnyUri(_) => {
                let text = lexical_trim();
                let d = string_to_double(&text);
                // string_to_double yields NaN for garbage; only the literal
                // NaN lexical form may produce it here
                if d.is_nan() && text != "NaN" {
                    Err(cast_err(value, target))
                } else {
                    Ok(V::Double(d))
                }
            }
            _ => Err(cast_err(value, target)),
        },

        T::QName => match value {
            V::String(_) | V::UntypedAtomic(_) => {
                let name =
                    QName::parse(&lexical_trim()).map_err(|_| cast_err(value, target))?;
                let uri = match &name.prefix {
                    Some(prefix) => Some(
                        namespaces
                            .and_then(|ns| ns.resolve(prefix))
                            .ok_or_else(|| XPathError::NoNamespaceForPrefix(prefix.clone()))?
                            .to_string(),
                    ),
                    None => None,
                };
                Ok(V::QName {
                    prefix: name.prefix,
                    uri,
                    local: name.local,
                })
            }
            _ => Err(cast_err(value, target)),
        },

        T::HexBinary => match value {
            V::Base64Binary(bytes) => Ok(V::HexBinary(bytes.clone())),
            V::String(_) | V::UntypedAtomic(_) => hex_decode(&lexical_trim())
                .map(V::HexBinary)
                .ok_or_else(|| cast_err(value, target)),
            _ => Err(cast_err(value, target)),
        },

        T::Base64Binary => match value {
            V::HexBinary(bytes) => Ok(V::Base64Binary(bytes.clone())),
            V::String(_) | V::UntypedAtomic(_) => base64_decode(&lexical())
                .map(V::Base64Binary)
                .ok_or_else(|| cast_err(value, target)),
            _ => Err(cast_err(value, target)),
        },

        T::DateTime => match value {
            V::Date(d) => Ok(V::DateTime(d.at_midnight())),
            V::String(_) | V::UntypedAtomic(_) => {
                DateTimeValue::parse(&lexical()).map(V::DateTime)
            }
            _ => Err(cast_err(value, target)),
        },

        T::Date => match value {
            V::DateTime(dt) => Ok(V::Date(dt.date())),
            V::String(_) | V::UntypedAtomic(_) => DateValue::parse(&lexical()).map(V::Date),
            _ => Err(cast_err(value, target)),
        },

        T::Time => match value {
            V::DateTime(dt) => Ok(V::Time(dt.time())),
            V::String(_) | V::UntypedAtomic(_) => TimeValue::parse(&lexical()).map(V::Time),
            _ => Err(cast_err(value, target)),
        },

        T::GYear | T::GYearMonth | T::GMonth | T::GMonthDay | T::GDay => {
            cast_to_g_type(value, target)
        }

        T::Duration => match value {
            V::YearMonthDuration(d) | V::DayTimeDuration(d) => Ok(V::Duration(d.clone())),
            V::String(_) | V::UntypedAtomic(_) => {
                DurationValue::parse(&lexical()).map(V::Duration)
            }
            _ => Err(cast_err(value, target)),
        },

        T::YearMonthDuration => match value {
            V::Duration(d) => Ok(V::YearMonthDuration(DurationValue::new(
                d.negative,
                d.months,
                Decimal::ZERO,
            ))),
            V::DayTimeDuration(_) => Ok(V::YearMonthDuration(DurationValue::new(
                false,
                0,
                Decimal::ZERO,
            ))),
            V::String(_) | V::UntypedAtomic(_) => {
                DurationValue::parse_year_month(&lexical()).map(V::YearMonthDuration)
            }
            _ => Err(cast_err(value, target)),
        },

        T::DayTimeDuration => match value {
            V::Duration(d) => Ok(V::DayTimeDuration(DurationValue::new(
                d.negative,
                0,
                d.seconds,
            ))),
            V::YearMonthDuration(_) => Ok(V::DayTimeDuration(DurationValue::new(
                false,
                0,
                Decimal::ZERO,
            ))),
            V::String(_) | V::UntypedAtomic(_) => {
                DurationValue::parse_day_time(&lexical()).map(V::DayTimeDuration)
            }
            _ => Err(cast_err(value, target)),
        },
    }
}

fn cast_to_integer(value: &AtomicValue) -> Option<i64> {
    match value {
        AtomicValue::Integer(i) => Some(*i),
        AtomicValue::Decimal(d) => d.trunc().to_i64(),
        AtomicValue::Double(d) => {
            if d.is_nan() || d.is_infinite() {
                None
            } else {
                Some(d.trunc() as i64)
            }
        }
        AtomicValue::Boolean(b) => Some(i64::from(*b)),
        AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
            s.trim().parse().ok()
        }
        _ => None,
    }
}

fn integer_in_range(n: i64, target: AtomicType) -> bool {
    use AtomicType::*;
    match target {
        Integer | Long => true,
        NonNegativeInteger | UnsignedLong => n >= 0,
        PositiveInteger => n > 0,
        NonPositiveInteger => n <= 0,
        NegativeInteger => n < 0,
        Int => i32::try_from(n).is_ok(),
        Short => i16::try_from(n).is_ok(),
        Byte => i8::try_from(n).is_ok(),
        UnsignedInt => (0..=u32::MAX as i64).contains(&n),
        UnsignedShort => (0..=u16::MAX as i64).contains(&n),
        UnsignedByte => (0..=u8::MAX as i64).contains(&n),
        _ => false,
    }
}

fn cast_to_g_type(value: &AtomicValue, target: AtomicType) -> Result<AtomicValue> {
    use AtomicType as T;
    use AtomicValue as V;

    let from_components = |year, month, day, tz| {
        let g = GCalendarValue {
            year,
            month,
            day,
            tz,
        };
        match target {
            T::GYear => V::GYear(GCalendarValue {
                month: None,
                day: None,
                ..g
            }),
            T::GYearMonth => V::GYearMonth(GCalendarValue { day: None, ..g }),
            T::GMonth => V::GMonth(GCalendarValue {
                year: None,
                day: None,
                ..g
            }),
            T::GMonthDay => V::GMonthDay(GCalendarValue { year: None, ..g }),
            _ => V::GDay(GCalendarValue {
                year: None,
                month: None,
                ..g
            }),
        }
    };

    match value {
        V::DateTime(dt) => Ok(from_components(
            Some(dt.year),
            Some(dt.month),
            Some(dt.day),
            dt.tz,
        )),
        V::Date(d) => Ok(from_components(
            Some(d.year),
            Some(d.month),
            Some(d.day),
            d.tz,
        )),
        V::String(_) | V::UntypedAtomic(_) => {
            let text = value.to_string_value();
            let parsed = match target {
                T::GYear => GCalendarValue::parse_g_year(&text)?,
                T::GYearMonth => GCalendarValue::parse_g_year_month(&text)?,
                T::GMonth => GCalendarValue::parse_g_month(&text)?,
                T::GMonthDay => GCalendarValue::parse_g_month_day(&text)?,
                _ => GCalendarValue::parse_g_day(&text)?,
            };
            Ok(match target {
                T::GYear => V::GYear(parsed),
                T::GYearMonth => V::GYearMonth(parsed),
                T::GMonth => V::GMonth(parsed),
                T::GMonthDay => V::GMonthDay(parsed),
                _ => V::GDay(parsed),
            })
        }
        _ => Err(cast_err(value, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> AtomicValue {
        AtomicValue::String(text.to_string())
    }

    #[test]
    fn boolean_accepts_only_the_four_lexical_forms() {
        for ok in ["true", "false", "1", "0", " true "] {
            assert!(cast_atomic(&s(ok), AtomicType::Boolean, None).is_ok());
        }
        for bad in ["TRUE", "yes", "", "2"] {
            assert!(cast_atomic(&s(bad), AtomicType::Boolean, None).is_err());
        }
    }

    #[test]
    fn integer_rejects_nan_and_infinity() {
        assert!(cast_atomic(&AtomicValue::Double(f64::NAN), AtomicType::Integer, None).is_err());
        assert!(
            cast_atomic(
                &AtomicValue::Double(f64::INFINITY),
                AtomicType::Integer,
                None
            )
            .is_err()
        );
        assert_eq!(
            cast_atomic(&AtomicValue::Double(3.9), AtomicType::Integer, None).unwrap(),
            AtomicValue::Integer(3)
        );
    }

    #[test]
    fn double_accepts_inf_forms() {
        assert_eq!(
            cast_atomic(&s("+INF"), AtomicType::Double, None).unwrap(),
            AtomicValue::Double(f64::INFINITY)
        );
        assert!(cast_atomic(&s("infinity"), AtomicType::Double, None).is_err());
        assert!(
            cast_atomic(&s("NaN"), AtomicType::Double, None)
                .unwrap()
                .is_nan()
        );
    }

    #[test]
    fn binary_casts_validate_their_alphabets() {
        assert!(cast_atomic(&s("ABC"), AtomicType::HexBinary, None).is_err());
        assert!(cast_atomic(&s("ABCD"), AtomicType::HexBinary, None).is_ok());
        assert!(cast_atomic(&s("TWFu"), AtomicType::Base64Binary, None).is_ok());
        assert!(cast_atomic(&s("TWF"), AtomicType::Base64Binary, None).is_err());
        // hex and base64 share the byte payload
        let hex = cast_atomic(&s("4D616E"), AtomicType::HexBinary, None).unwrap();
        let b64 = cast_atomic(&hex, AtomicType::Base64Binary, None).unwrap();
        assert_eq!(b64.to_string_value(), "TWFu");
    }

    #[test]
    fn qname_cast_resolves_prefixes() {
        let ns = Namespaces::new().bind("p", "http://x");
        let q = cast_atomic(&s("p:k"), AtomicType::QName, Some(&ns)).unwrap();
        match q {
            AtomicValue::QName { uri, local, .. } => {
                assert_eq!(uri.as_deref(), Some("http://x"));
                assert_eq!(local, "k");
            }
            other => panic!("expected QName, got {:?}", other),
        }
        let err = cast_atomic(&s("nope:k"), AtomicType::QName, Some(&ns)).unwrap_err();
        assert_eq!(err.code(), "FONS0004");
    }

    #[test]
    fn casting_is_idempotent() {
        let cases = [
            (s("42"), AtomicType::Integer),
            (s("1.5"), AtomicType::Decimal),
            (s("true"), AtomicType::Boolean),
            (s("2024-07-09"), AtomicType::Date),
            (s("P1Y2M"), AtomicType::YearMonthDuration),
            (s("PT5.5S"), AtomicType::DayTimeDuration),
            (s("--07-09"), AtomicType::GMonthDay),
        ];
        for (value, target) in cases {
            let once = cast_atomic(&value, target, None).unwrap();
            let twice = cast_atomic(&once, target, None).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn duration_subtype_casts_truncate() {
        let full = cast_atomic(&s("P1Y2M3DT4H"), AtomicType::Duration, None).unwrap();
        let ym = cast_atomic(&full, AtomicType::YearMonthDuration, None).unwrap();
        assert_eq!(ym.to_string_value(), "P1Y2M");
        let dt = cast_atomic(&full, AtomicType::DayTimeDuration, None).unwrap();
        assert_eq!(dt.to_string_value(), "P3DT4H");
    }

    #[test]
    fn date_to_g_types_extracts_components() {
        let date = cast_atomic(&s("2024-07-09"), AtomicType::Date, None).unwrap();
        assert_eq!(
            cast_atomic(&date, AtomicType::GMonthDay, None)
                .unwrap()
                .to_string_value(),
            "--07-09"
        );
        assert_eq!(
            cast_atomic(&date, AtomicType::GYear, None)
                .unwrap()
                .to_string_value(),
            "2024"
        );
    }
}
