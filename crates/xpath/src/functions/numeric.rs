//! Numeric functions.
//!
//! `round` is round-half-to-positive-infinity and keeps the negative-zero
//! result for arguments in (−0.5, 0); `min`/`max`/`avg` propagate NaN and
//! compare strings through the collation.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;

use stilo_xdm::SourceNode;

use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::format;
use crate::functions::{
    ArgType, Table, def, optional_atomic_arg, optional_string_arg, string_arg,
};
use crate::types::{AtomicValue, XdmItem, XdmValue};

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "number", 0, Some(1), &[ArgType::Any], fn_number);
    def(table, "abs", 1, Some(1), &[ArgType::Numeric], fn_abs);
    def(table, "ceiling", 1, Some(1), &[ArgType::Numeric], fn_ceiling);
    def(table, "floor", 1, Some(1), &[ArgType::Numeric], fn_floor);
    def(table, "round", 1, Some(2), &[ArgType::Numeric, ArgType::Numeric], fn_round);
    def(
        table,
        "round-half-to-even",
        1,
        Some(2),
        &[ArgType::Numeric, ArgType::Numeric],
        fn_round_half_to_even,
    );
    def(table, "sum", 1, Some(2), &[ArgType::Any, ArgType::Any], fn_sum);
    def(table, "avg", 1, Some(1), &[ArgType::Any], fn_avg);
    def(table, "min", 1, Some(2), &[ArgType::Any, ArgType::String], fn_min);
    def(table, "max", 1, Some(2), &[ArgType::Any, ArgType::String], fn_max);
    def(
        table,
        "format-integer",
        2,
        Some(3),
        &[ArgType::Any, ArgType::String, ArgType::String],
        fn_format_integer,
    );
}

pub fn fn_number<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let value = match args.first() {
        Some(v) => v.to_double(),
        None => match &ctx.item {
            Some(item) => XdmValue::from_item(item.clone()).to_double(),
            None => return Err(XPathError::NoContextItem),
        },
    };
    Ok(XdmValue::from_double(value))
}

fn unary_numeric<N: SourceNode>(
    args: &[XdmValue<N>],
    f_int: impl Fn(i64) -> i64,
    f_dec: impl Fn(Decimal) -> Decimal,
    f_dbl: impl Fn(f64) -> f64,
) -> Result<XdmValue<N>> {
    match optional_atomic_arg(args, 0)? {
        None => Ok(XdmValue::empty()),
        Some(AtomicValue::Integer(i)) => Ok(XdmValue::from_integer(f_int(i))),
        Some(AtomicValue::Decimal(d)) => Ok(XdmValue::from_decimal(f_dec(d))),
        Some(other) => Ok(XdmValue::from_double(f_dbl(other.to_double()))),
    }
}

pub fn fn_abs<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    unary_numeric(&args, i64::abs, |d| d.abs(), f64::abs)
}

pub fn fn_ceiling<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    unary_numeric(&args, |i| i, |d| d.ceil(), f64::ceil)
}

pub fn fn_floor<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    unary_numeric(&args, |i| i, |d| d.floor(), f64::floor)
}

/// Round half toward positive infinity, preserving −0.0 when a negative
/// argument rounds to zero.
pub fn round_half_up(x: f64) -> f64 {
    if x.is_nan() || x.is_infinite() {
        return x;
    }
    let rounded = (x + 0.5).floor();
    if rounded == 0.0 && x < 0.0 {
        -0.0
    } else {
        rounded
    }
}

pub fn fn_round<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let precision = match optional_atomic_arg(&args, 1)? {
        Some(p) => p.to_double() as i32,
        None => 0,
    };
    match optional_atomic_arg(&args, 0)? {
        None => Ok(XdmValue::empty()),
        Some(AtomicValue::Integer(i)) if precision >= 0 => Ok(XdmValue::from_integer(i)),
        Some(AtomicValue::Decimal(d)) => {
            if precision >= 0 {
                Ok(XdmValue::from_decimal(d.round_dp_with_strategy(
                    precision as u32,
                    RoundingStrategy::MidpointAwayFromZero,
                )))
            } else {
                let scale = Decimal::from(10i64.pow((-precision) as u32));
                let scaled = (d / scale + Decimal::new(5, 1)).floor();
                Ok(XdmValue::from_decimal(scaled * scale))
            }
        }
        Some(other) => {
            let x = other.to_double();
            let scale = 10f64.powi(precision);
            let rounded = round_half_up(x * scale) / scale;
            Ok(XdmValue::from_double(rounded))
        }
    }
}

pub fn fn_round_half_to_even<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let precision = match optional_atomic_arg(&args, 1)? {
        Some(p) => p.to_double() as i32,
        None => 0,
    };
    match optional_atomic_arg(&args, 0)? {
        None => Ok(XdmValue::empty()),
        Some(AtomicValue::Integer(i)) if precision >= 0 => Ok(XdmValue::from_integer(i)),
        Some(AtomicValue::Decimal(d)) if precision >= 0 => {
            Ok(XdmValue::from_decimal(d.round_dp_with_strategy(
                precision as u32,
                RoundingStrategy::MidpointNearestEven,
            )))
        }
        Some(other) => {
            let x = other.to_double();
            if x.is_nan() || x.is_infinite() {
                return Ok(XdmValue::from_double(x));
            }
            let scale = 10f64.powi(precision);
            let scaled = x * scale;
            let floor = scaled.floor();
            let frac = scaled - floor;
            let rounded = if frac > 0.5 {
                floor + 1.0
            } else if frac < 0.5 {
                floor
            } else if (floor as i64) % 2 == 0 {
                floor
            } else {
                floor + 1.0
            };
            Ok(XdmValue::from_double(rounded / scale))
        }
    }
}

pub fn fn_sum<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let atomics = args[0].atomized()?;
    if atomics.is_empty() {
        return Ok(match args.get(1) {
            Some(zero) => zero.clone(),
            None => XdmValue::from_integer(0),
        });
    }
    let _ = ctx;
    sum_atomics(&atomics).map(XdmValue::from_atomic)
}

fn sum_atomics(atomics: &[AtomicValue]) -> Result<AtomicValue> {
    let mut any_double = false;
    let mut total = Decimal::ZERO;
    let mut all_integer = true;
    for value in atomics {
        match value {
            AtomicValue::Integer(i) => total += Decimal::from(*i),
            AtomicValue::Decimal(d) => {
                all_integer = false;
                total += *d;
            }
            other => {
                any_double = true;
                let d = other.to_double();
                if d.is_nan() {
                    return Ok(AtomicValue::Double(f64::NAN));
                }
                total += Decimal::try_from(d).unwrap_or(Decimal::ZERO);
            }
        }
    }
    Ok(if any_double {
        AtomicValue::Double(total.to_f64().unwrap_or(f64::NAN))
    } else if all_integer {
        AtomicValue::Integer(total.to_i64().unwrap_or(0))
    } else {
        AtomicValue::Decimal(total)
    })
}

pub fn fn_avg<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let atomics = args[0].atomized()?;
    if atomics.is_empty() {
        return Ok(XdmValue::empty());
    }
    match sum_atomics(&atomics)? {
        AtomicValue::Double(d) => Ok(XdmValue::from_double(d / atomics.len() as f64)),
        AtomicValue::Integer(i) => Ok(XdmValue::from_decimal(
            Decimal::from(i) / Decimal::from(atomics.len() as i64),
        )),
        AtomicValue::Decimal(d) => Ok(XdmValue::from_decimal(
            d / Decimal::from(atomics.len() as i64),
        )),
        other => Ok(XdmValue::from_atomic(other)),
    }
}

fn extreme<N: SourceNode>(
    args: &[XdmValue<N>],
    ctx: &EvaluationContext<'_, N>,
    want_max: bool,
) -> Result<XdmValue<N>> {
    let atomics = args[0].atomized()?;
    if atomics.is_empty() {
        return Ok(XdmValue::empty());
    }
    let collation = ctx.resolve_collation(optional_string_arg(args, 1).as_deref())?;
    let mut best: Option<AtomicValue> = None;
    for value in &atomics {
        // untyped values compare as doubles
        let value = match value {
            AtomicValue::UntypedAtomic(_) => AtomicValue::Double(value.to_double()),
            other => other.clone(),
        };
        if value.is_nan() {
            return Ok(XdmValue::from_double(f64::NAN));
        }
        best = Some(match best {
            None => value,
            Some(current) => {
                let ord = current
                    .compare(&value, &collation, ctx.implicit_timezone)
                    .ok_or_else(|| {
                        XPathError::type_mismatch(
                            "values are not comparable",
                            current.type_name(),
                            value.type_name(),
                        )
                    })?;
                let replace = if want_max {
                    ord == std::cmp::Ordering::Less
                } else {
                    ord == std::cmp::Ordering::Greater
                };
                if replace { value } else { current }
            }
        });
    }
    Ok(XdmValue::from_atomic(best.expect("nonempty input")))
}

pub fn fn_min<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    extreme(&args, ctx, false)
}

pub fn fn_max<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    extreme(&args, ctx, true)
}

pub fn fn_format_integer<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match optional_atomic_arg(&args, 0)? {
        None => Ok(XdmValue::from_string("")),
        Some(value) => {
            let n = match value {
                AtomicValue::Integer(i) => i,
                other => other.to_double() as i64,
            };
            let picture = string_arg(&args, 1);
            format::format_integer(n, &picture).map(XdmValue::from_string)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::XmlNode;

    type Ctx<'h> = EvaluationContext<'h, XmlNode>;
    type V = XdmValue<XmlNode>;

    #[test]
    fn round_is_half_toward_positive_infinity() {
        let ctx = Ctx::new();
        assert_eq!(fn_round(vec![V::from_double(0.5)], &ctx).unwrap().to_double(), 1.0);
        assert_eq!(fn_round(vec![V::from_double(2.5)], &ctx).unwrap().to_double(), 3.0);
        let out = fn_round(vec![V::from_double(-0.5)], &ctx).unwrap().to_double();
        assert_eq!(out, 0.0);
        assert!(out.is_sign_negative(), "round(-0.5) keeps the negative sign");
        let out = fn_round(vec![V::from_double(-0.25)], &ctx).unwrap().to_double();
        assert!(out == 0.0 && out.is_sign_negative());
        assert_eq!(fn_round(vec![V::from_double(-2.5)], &ctx).unwrap().to_double(), -2.0);
    }

    #[test]
    fn two_argument_round_uses_decimal_precision() {
        let ctx = Ctx::new();
        let out = fn_round(vec![V::from_double(1.125), V::from_integer(2)], &ctx).unwrap();
        assert_eq!(out.to_double(), 1.13);
    }

    #[test]
    fn round_half_to_even_is_bankers() {
        let ctx = Ctx::new();
        assert_eq!(
            fn_round_half_to_even(vec![V::from_double(2.5)], &ctx).unwrap().to_double(),
            2.0
        );
        assert_eq!(
            fn_round_half_to_even(vec![V::from_double(3.5)], &ctx).unwrap().to_double(),
            4.0
        );
    }

    #[test]
    fn sum_defaults_to_zero_and_honors_zero_arg() {
        let ctx = Ctx::new();
        assert_eq!(fn_sum(vec![V::empty()], &ctx).unwrap().to_double(), 0.0);
        let out = fn_sum(vec![V::empty(), V::from_string("none")], &ctx).unwrap();
        assert_eq!(out.to_string_value(), "none");
    }

    #[test]
    fn min_max_propagate_nan() {
        let ctx = Ctx::new();
        let mut seq = V::from_double(1.0);
        seq.extend(V::from_double(f64::NAN));
        seq.extend(V::from_double(3.0));
        assert!(fn_min(vec![seq.clone()], &ctx).unwrap().to_double().is_nan());
        assert!(fn_max(vec![seq], &ctx).unwrap().to_double().is_nan());
    }

    #[test]
    fn min_max_compare_strings_with_collation() {
        let ctx = Ctx::new();
        let mut seq = V::from_string("pear");
        seq.extend(V::from_string("apple"));
        assert_eq!(fn_min(vec![seq.clone()], &ctx).unwrap().to_string_value(), "apple");
        assert_eq!(fn_max(vec![seq], &ctx).unwrap().to_string_value(), "pear");
    }

    #[test]
    fn avg_of_integers_is_exact() {
        let ctx = Ctx::new();
        let mut seq = V::from_integer(1);
        seq.extend(V::from_integer(2));
        assert_eq!(fn_avg(vec![seq], &ctx).unwrap().to_string_value(), "1.5");
    }
}
