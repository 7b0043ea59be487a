//! Date, time and duration functions.
//!
//! The `current-*` functions observe a snapshot captured at first use and
//! stable for the whole transformation. Component extractors return the
//! empty sequence for an empty argument and respect duration signs.

use rust_decimal::Decimal;

use stilo_xdm::SourceNode;

use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::functions::{ArgType, Table, def, optional_atomic_arg};
use crate::types::datetime::{DateTimeValue, DurationValue};
use crate::types::{AtomicValue, XdmValue};

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "current-dateTime", 0, Some(0), &[], fn_current_datetime);
    def(table, "current-date", 0, Some(0), &[], fn_current_date);
    def(table, "current-time", 0, Some(0), &[], fn_current_time);
    def(table, "implicit-timezone", 0, Some(0), &[], fn_implicit_timezone);
    def(
        table,
        "dateTime",
        2,
        Some(2),
        &[ArgType::Any, ArgType::Any],
        fn_datetime,
    );

    macro_rules! component {
        ($name:literal, $f:ident) => {
            def(table, $name, 1, Some(1), &[ArgType::Any], $f);
        };
    }
    component!("year-from-dateTime", fn_year_from_datetime);
    component!("month-from-dateTime", fn_month_from_datetime);
    component!("day-from-dateTime", fn_day_from_datetime);
    component!("hours-from-dateTime", fn_hours_from_datetime);
    component!("minutes-from-dateTime", fn_minutes_from_datetime);
    component!("seconds-from-dateTime", fn_seconds_from_datetime);
    component!("timezone-from-dateTime", fn_timezone_from_datetime);
    component!("year-from-date", fn_year_from_date);
    component!("month-from-date", fn_month_from_date);
    component!("day-from-date", fn_day_from_date);
    component!("timezone-from-date", fn_timezone_from_date);
    component!("hours-from-time", fn_hours_from_time);
    component!("minutes-from-time", fn_minutes_from_time);
    component!("seconds-from-time", fn_seconds_from_time);
    component!("timezone-from-time", fn_timezone_from_time);
    component!("years-from-duration", fn_years_from_duration);
    component!("months-from-duration", fn_months_from_duration);
    component!("days-from-duration", fn_days_from_duration);
    component!("hours-from-duration", fn_hours_from_duration);
    component!("minutes-from-duration", fn_minutes_from_duration);
    component!("seconds-from-duration", fn_seconds_from_duration);
}

pub fn fn_current_datetime<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_atomic(AtomicValue::DateTime(
        ctx.current_datetime(),
    )))
}

pub fn fn_current_date<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_atomic(AtomicValue::Date(
        ctx.current_datetime().date(),
    )))
}

pub fn fn_current_time<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_atomic(AtomicValue::Time(
        ctx.current_datetime().time(),
    )))
}

pub fn fn_implicit_timezone<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_atomic(AtomicValue::DayTimeDuration(
        DurationValue::from_seconds(Decimal::from(ctx.implicit_timezone as i64 * 60)),
    )))
}

/// Combines a date and a time; their timezones must agree when both are
/// present.
pub fn fn_datetime<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let date = match optional_atomic_arg(&args, 0)? {
        None => return Ok(XdmValue::empty()),
        Some(AtomicValue::Date(d)) => d,
        Some(other) => {
            return Err(XPathError::type_mismatch(
                "first argument of dateTime",
                "xs:date",
                other.type_name(),
            ));
        }
    };
    let time = match optional_atomic_arg(&args, 1)? {
        None => return Ok(XdmValue::empty()),
        Some(AtomicValue::Time(t)) => t,
        Some(other) => {
            return Err(XPathError::type_mismatch(
                "second argument of dateTime",
                "xs:time",
                other.type_name(),
            ));
        }
    };
    let tz = match (date.tz, time.tz) {
        (Some(a), Some(b)) if a != b => return Err(XPathError::TimezoneConflict),
        (a, b) => a.or(b),
    };
    Ok(XdmValue::from_atomic(AtomicValue::DateTime(DateTimeValue {
        year: date.year,
        month: date.month,
        day: date.day,
        hour: time.hour,
        minute: time.minute,
        second: time.second,
        tz,
    })))
}

fn timezone_value<N: SourceNode>(tz: Option<i32>) -> XdmValue<N> {
    match tz {
        Some(offset) => XdmValue::from_atomic(AtomicValue::DayTimeDuration(
            DurationValue::from_seconds(Decimal::from(offset as i64 * 60)),
        )),
        None => XdmValue::empty(),
    }
}

macro_rules! extractor {
    ($name:ident, $pattern:pat => $body:expr, $required:literal) => {
        pub fn $name<N: SourceNode>(
            args: Vec<XdmValue<N>>,
            _ctx: &EvaluationContext<'_, N>,
        ) -> Result<XdmValue<N>> {
            match optional_atomic_arg(&args, 0)? {
                None => Ok(XdmValue::empty()),
                Some($pattern) => Ok($body),
                Some(other) => Err(XPathError::type_mismatch(
                    concat!("argument of ", stringify!($name)),
                    $required,
                    other.type_name(),
                )),
            }
        }
    };
}

extractor!(fn_year_from_datetime, AtomicValue::DateTime(v) => XdmValue::from_integer(v.year as i64), "xs:dateTime");
extractor!(fn_month_from_datetime, AtomicValue::DateTime(v) => XdmValue::from_integer(v.month as i64), "xs:dateTime");
extractor!(fn_day_from_datetime, AtomicValue::DateTime(v) => XdmValue::from_integer(v.day as i64), "xs:dateTime");
extractor!(fn_hours_from_datetime, AtomicValue::DateTime(v) => XdmValue::from_integer(v.hour as i64), "xs:dateTime");
extractor!(fn_minutes_from_datetime, AtomicValue::DateTime(v) => XdmValue::from_integer(v.minute as i64), "xs:dateTime");
extractor!(fn_seconds_from_datetime, AtomicValue::DateTime(v) => XdmValue::from_decimal(v.second), "xs:dateTime");
extractor!(fn_timezone_from_datetime, AtomicValue::DateTime(v) => timezone_value(v.tz), "xs:dateTime");
extractor!(fn_year_from_date, AtomicValue::Date(v) => XdmValue::from_integer(v.year as i64), "xs:date");
extractor!(fn_month_from_date, AtomicValue::Date(v) => XdmValue::from_integer(v.month as i64), "xs:date");
extractor!(fn_day_from_date, AtomicValue::Date(v) => XdmValue::from_integer(v.day as i64), "xs:date");
extractor!(fn_timezone_from_date, AtomicValue::Date(v) => timezone_value(v.tz), "xs:date");
extractor!(fn_hours_from_time, AtomicValue::Time(v) => XdmValue::from_integer(v.hour as i64), "xs:time");
extractor!(fn_minutes_from_time, AtomicValue::Time(v) => XdmValue::from_integer(v.minute as i64), "xs:time");
extractor!(fn_seconds_from_time, AtomicValue::Time(v) => XdmValue::from_decimal(v.second), "xs:time");
extractor!(fn_timezone_from_time, AtomicValue::Time(v) => timezone_value(v.tz), "xs:time");

fn duration_arg<N: SourceNode>(args: &[XdmValue<N>]) -> Result<Option<DurationValue>> {
    match optional_atomic_arg(args, 0)? {
        None => Ok(None),
        Some(
            AtomicValue::Duration(d)
            | AtomicValue::YearMonthDuration(d)
            | AtomicValue::DayTimeDuration(d),
        ) => Ok(Some(d)),
        Some(other) => Err(XPathError::type_mismatch(
            "argument of a duration extractor",
            "xs:duration",
            other.type_name(),
        )),
    }
}

macro_rules! duration_extractor {
    ($name:ident, $component:ident) => {
        pub fn $name<N: SourceNode>(
            args: Vec<XdmValue<N>>,
            _ctx: &EvaluationContext<'_, N>,
        ) -> Result<XdmValue<N>> {
            match duration_arg(&args)? {
                None => Ok(XdmValue::empty()),
                Some(d) => Ok(XdmValue::from_integer(d.$component())),
            }
        }
    };
}

duration_extractor!(fn_years_from_duration, years_component);
duration_extractor!(fn_months_from_duration, months_component);
duration_extractor!(fn_days_from_duration, days_component);
duration_extractor!(fn_hours_from_duration, hours_component);
duration_extractor!(fn_minutes_from_duration, minutes_component);

pub fn fn_seconds_from_duration<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match duration_arg(&args)? {
        None => Ok(XdmValue::empty()),
        Some(d) => Ok(XdmValue::from_decimal(d.seconds_component())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::XmlNode;

    type Ctx<'h> = EvaluationContext<'h, XmlNode>;
    type V = XdmValue<XmlNode>;

    fn date(s: &str) -> V {
        V::from_atomic(AtomicValue::Date(
            crate::types::datetime::DateValue::parse(s).unwrap(),
        ))
    }

    fn time(s: &str) -> V {
        V::from_atomic(AtomicValue::Time(
            crate::types::datetime::TimeValue::parse(s).unwrap(),
        ))
    }

    #[test]
    fn datetime_constructor_combines_components() {
        let ctx = Ctx::new();
        let out = fn_datetime(vec![date("2024-07-09"), time("08:05:03")], &ctx).unwrap();
        assert_eq!(out.to_string_value(), "2024-07-09T08:05:03");
    }

    #[test]
    fn datetime_constructor_rejects_conflicting_timezones() {
        let ctx = Ctx::new();
        let err =
            fn_datetime(vec![date("2024-07-09Z"), time("08:00:00+01:00")], &ctx).unwrap_err();
        assert_eq!(err.code(), "FORG0008");
        // one-sided timezone wins
        let out = fn_datetime(vec![date("2024-07-09Z"), time("08:00:00")], &ctx).unwrap();
        assert_eq!(out.to_string_value(), "2024-07-09T08:00:00Z");
    }

    #[test]
    fn extractors_return_empty_for_empty_input() {
        let ctx = Ctx::new();
        assert!(fn_year_from_datetime(vec![V::empty()], &ctx).unwrap().is_empty());
        assert!(fn_timezone_from_date(vec![V::empty()], &ctx).unwrap().is_empty());
    }

    #[test]
    fn duration_extractors_respect_sign() {
        let ctx = Ctx::new();
        let d = V::from_atomic(AtomicValue::Duration(
            DurationValue::parse("-P2Y3MT4.5S").unwrap(),
        ));
        assert_eq!(
            fn_years_from_duration(vec![d.clone()], &ctx).unwrap().to_double(),
            -2.0
        );
        assert_eq!(
            fn_months_from_duration(vec![d.clone()], &ctx).unwrap().to_double(),
            -3.0
        );
        assert_eq!(
            fn_seconds_from_duration(vec![d], &ctx).unwrap().to_string_value(),
            "-4.5"
        );
    }

    #[test]
    fn current_functions_are_stable() {
        let ctx = Ctx::new();
        let a = fn_current_datetime(vec![], &ctx).unwrap();
        let b = fn_current_datetime(vec![], &ctx).unwrap();
        assert_eq!(a, b);
    }
}
