//! Binary operators: comparisons, arithmetic, and node-set operations.
//!
//! Numeric arithmetic promotes along integer → decimal → double; integer
//! overflow widens to decimal rather than wrapping. Calendar arithmetic
//! covers the date/time ± duration and dateTime − dateTime forms. Node-set
//! operators return document order without duplicates.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use stilo_xdm::SourceNode;

use crate::ast::BinaryOp;
use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::types::datetime::DurationValue;
use crate::types::{AtomicValue, XdmItem, XdmValue, cast::cast_atomic, sort_dedup_nodes};

pub fn evaluate_binary<N: SourceNode>(
    op: BinaryOp,
    left: XdmValue<N>,
    right: XdmValue<N>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match op {
        BinaryOp::Or | BinaryOp::And => {
            // short-circuiting lives in the engine; this handles the
            // already-evaluated pair
            let l = left.effective_boolean_value()?;
            let r = right.effective_boolean_value()?;
            Ok(XdmValue::from_boolean(if op == BinaryOp::Or {
                l || r
            } else {
                l && r
            }))
        }

        BinaryOp::ValueEq
        | BinaryOp::ValueNe
        | BinaryOp::ValueLt
        | BinaryOp::ValueLe
        | BinaryOp::ValueGt
        | BinaryOp::ValueGe => value_comparison(op, left, right, ctx),

        BinaryOp::GeneralEq
        | BinaryOp::GeneralNe
        | BinaryOp::GeneralLt
        | BinaryOp::GeneralLe
        | BinaryOp::GeneralGt
        | BinaryOp::GeneralGe => general_comparison(op, left, right, ctx),

        BinaryOp::Is | BinaryOp::Precedes | BinaryOp::Follows => {
            node_comparison(op, left, right)
        }

        BinaryOp::Union | BinaryOp::Intersect | BinaryOp::Except => {
            set_operation(op, left, right)
        }

        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::IntegerDivide
        | BinaryOp::Modulo => arithmetic(op, left, right, ctx),
    }
}

// --- comparisons --------------------------------------------------------

fn ordering_satisfies(op: BinaryOp, ord: Ordering) -> bool {
    match op {
        BinaryOp::ValueEq | BinaryOp::GeneralEq => ord == Ordering::Equal,
        BinaryOp::ValueNe | BinaryOp::GeneralNe => ord != Ordering::Equal,
        BinaryOp::ValueLt | BinaryOp::GeneralLt => ord == Ordering::Less,
        BinaryOp::ValueLe | BinaryOp::GeneralLe => ord != Ordering::Greater,
        BinaryOp::ValueGt | BinaryOp::GeneralGt => ord == Ordering::Greater,
        BinaryOp::ValueGe | BinaryOp::GeneralGe => ord != Ordering::Less,
        _ => false,
    }
}

fn value_comparison<N: SourceNode>(
    op: BinaryOp,
    left: XdmValue<N>,
    right: XdmValue<N>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let l = left.atomized()?;
    let r = right.atomized()?;
    if l.is_empty() || r.is_empty() {
        return Ok(XdmValue::empty());
    }
    if l.len() > 1 || r.len() > 1 {
        return Err(XPathError::type_error(
            "value comparison requires singleton operands",
        ));
    }
    let a = untyped_to_string(&l[0]);
    let b = untyped_to_string(&r[0]);
    match a.compare(&b, ctx.default_collation(), ctx.implicit_timezone) {
        Some(ord) => Ok(XdmValue::from_boolean(ordering_satisfies(op, ord))),
        None => {
            // NaN comparisons are false for eq/lt/…, true only for ne
            if a.is_nan() || b.is_nan() {
                return Ok(XdmValue::from_boolean(matches!(op, BinaryOp::ValueNe)));
            }
            Err(XPathError::type_mismatch(
                "operands are not comparable",
                a.type_name(),
                b.type_name(),
            ))
        }
    }
}

fn untyped_to_string(value: &AtomicValue) -> AtomicValue {
    match value {
        AtomicValue::UntypedAtomic(s) => AtomicValue::String(s.clone()),
        other => other.clone(),
    }
}

/// Coerces an untyped operand against its comparand for a general
/// comparison: numeric comparand pulls the untyped value to double,
/// anything else pulls it to the comparand's type.
fn general_coerce(
    untyped: &AtomicValue,
    against: &AtomicValue,
) -> Result<AtomicValue> {
    match against {
        AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_) => {
            Ok(AtomicValue::Double(untyped.to_double()))
        }
        AtomicValue::UntypedAtomic(_) | AtomicValue::String(_) | AtomicValue::AnyUri(_) => {
            Ok(AtomicValue::String(untyped.to_string_value()))
        }
        other => cast_atomic(untyped, other.atomic_type(), None),
    }
}

fn general_comparison<N: SourceNode>(
    op: BinaryOp,
    left: XdmValue<N>,
    right: XdmValue<N>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let l = left.atomized()?;
    let r = right.atomized()?;
    for a in &l {
        for b in &r {
            let (a2, b2) = match (a, b) {
                (AtomicValue::UntypedAtomic(_), _) => (general_coerce(a, b)?, b.clone()),
                (_, AtomicValue::UntypedAtomic(_)) => (a.clone(), general_coerce(b, a)?),
                _ => (a.clone(), b.clone()),
            };
            if let Some(ord) =
                a2.compare(&b2, ctx.default_collation(), ctx.implicit_timezone)
            {
                if ordering_satisfies(op, ord) {
                    return Ok(XdmValue::from_boolean(true));
                }
            } else if !a2.is_nan() && !b2.is_nan() {
                return Err(XPathError::type_mismatch(
                    "operands are not comparable",
                    a2.type_name(),
                    b2.type_name(),
                ));
            }
        }
    }
    Ok(XdmValue::from_boolean(false))
}

fn node_comparison<N: SourceNode>(
    op: BinaryOp,
    left: XdmValue<N>,
    right: XdmValue<N>,
) -> Result<XdmValue<N>> {
    if left.is_empty() || right.is_empty() {
        return Ok(XdmValue::empty());
    }
    let single_node = |value: &XdmValue<N>| -> Result<N> {
        if value.len() != 1 {
            return Err(XPathError::type_error(
                "node comparison requires singleton operands",
            ));
        }
        value
            .first()
            .and_then(XdmItem::as_node)
            .cloned()
            .ok_or_else(|| XPathError::type_error("node comparison requires nodes"))
    };
    let a = single_node(&left)?;
    let b = single_node(&right)?;
    let result = match op {
        BinaryOp::Is => a.is_same_node(&b),
        BinaryOp::Precedes => a.document_order() < b.document_order(),
        _ => a.document_order() > b.document_order(),
    };
    Ok(XdmValue::from_boolean(result))
}

fn set_operation<N: SourceNode>(
    op: BinaryOp,
    left: XdmValue<N>,
    right: XdmValue<N>,
) -> Result<XdmValue<N>> {
    let lhs = left
        .nodes()
        .ok_or_else(|| XPathError::type_error("set operator requires node sequences"))?;
    let rhs = right
        .nodes()
        .ok_or_else(|| XPathError::type_error("set operator requires node sequences"))?;
    let rhs_set: std::collections::HashSet<N> = rhs.iter().cloned().collect();
    let nodes = match op {
        BinaryOp::Union => {
            let mut all = lhs;
            all.extend(rhs);
            all
        }
        BinaryOp::Intersect => lhs.into_iter().filter(|n| rhs_set.contains(n)).collect(),
        _ => lhs.into_iter().filter(|n| !rhs_set.contains(n)).collect(),
    };
    Ok(XdmValue::from_nodes(sort_dedup_nodes(nodes)))
}

// --- arithmetic ---------------------------------------------------------

fn arithmetic<N: SourceNode>(
    op: BinaryOp,
    left: XdmValue<N>,
    right: XdmValue<N>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let l = left.atomized()?;
    let r = right.atomized()?;
    if l.is_empty() || r.is_empty() {
        return Ok(XdmValue::empty());
    }
    if l.len() > 1 || r.len() > 1 {
        return Err(XPathError::type_error(
            "arithmetic requires singleton operands",
        ));
    }
    let a = untyped_to_double(&l[0]);
    let b = untyped_to_double(&r[0]);
    arithmetic_atomic(op, &a, &b, ctx).map(XdmValue::from_atomic)
}

fn untyped_to_double(value: &AtomicValue) -> AtomicValue {
    match value {
        AtomicValue::UntypedAtomic(_) => AtomicValue::Double(value.to_double()),
        other => other.clone(),
    }
}

pub fn arithmetic_atomic<N: SourceNode>(
    op: BinaryOp,
    a: &AtomicValue,
    b: &AtomicValue,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<AtomicValue> {
    use AtomicValue as V;

    if a.is_numeric() && b.is_numeric() {
        return numeric_arithmetic(op, a, b);
    }

    // calendar and duration forms
    match (op, a, b) {
        // dateTime/date/time ± duration
        (BinaryOp::Add | BinaryOp::Subtract, V::DateTime(dt), dur) if is_duration(dur) => {
            let (months, seconds) = signed_duration(dur, op == BinaryOp::Subtract);
            Ok(V::DateTime(dt.add(months, seconds)))
        }
        (BinaryOp::Add, dur, V::DateTime(dt)) if is_duration(dur) => {
            let (months, seconds) = signed_duration(dur, false);
            Ok(V::DateTime(dt.add(months, seconds)))
        }
        (BinaryOp::Add | BinaryOp::Subtract, V::Date(d), dur) if is_duration(dur) => {
            let (months, seconds) = signed_duration(dur, op == BinaryOp::Subtract);
            Ok(V::Date(d.at_midnight().add(months, seconds).date()))
        }
        (BinaryOp::Add, dur, V::Date(d)) if is_duration(dur) => {
            let (months, seconds) = signed_duration(dur, false);
            Ok(V::Date(d.at_midnight().add(months, seconds).date()))
        }
        (BinaryOp::Add | BinaryOp::Subtract, V::Time(t), V::DayTimeDuration(dur)) => {
            let seconds = if op == BinaryOp::Subtract {
                -dur.signed_seconds()
            } else {
                dur.signed_seconds()
            };
            let base = crate::types::datetime::DateTimeValue {
                year: 2000,
                month: 1,
                day: 1,
                hour: t.hour,
                minute: t.minute,
                second: t.second,
                tz: t.tz,
            };
            Ok(V::Time(base.add(0, seconds).time()))
        }

        // dateTime − dateTime and friends
        (BinaryOp::Subtract, V::DateTime(x), V::DateTime(y)) => Ok(V::DayTimeDuration(
            DurationValue::from_seconds(
                x.epoch_seconds(0) - y.epoch_seconds(0),
            ),
        )),
        (BinaryOp::Subtract, V::Date(x), V::Date(y)) => Ok(V::DayTimeDuration(
            DurationValue::from_seconds(x.epoch_seconds(0) - y.epoch_seconds(0)),
        )),
        (BinaryOp::Subtract, V::Time(x), V::Time(y)) => Ok(V::DayTimeDuration(
            DurationValue::from_seconds(x.epoch_seconds(0) - y.epoch_seconds(0)),
        )),

        // duration ± duration (matching kinds)
        (BinaryOp::Add | BinaryOp::Subtract, V::YearMonthDuration(x), V::YearMonthDuration(y)) => {
            let months = if op == BinaryOp::Add {
                x.signed_months() + y.signed_months()
            } else {
                x.signed_months() - y.signed_months()
            };
            Ok(V::YearMonthDuration(DurationValue::from_months(months)))
        }
        (BinaryOp::Add | BinaryOp::Subtract, V::DayTimeDuration(x), V::DayTimeDuration(y)) => {
            let seconds = if op == BinaryOp::Add {
                x.signed_seconds() + y.signed_seconds()
            } else {
                x.signed_seconds() - y.signed_seconds()
            };
            Ok(V::DayTimeDuration(DurationValue::from_seconds(seconds)))
        }

        // duration × number, duration ÷ number, duration ÷ duration
        (BinaryOp::Multiply, V::YearMonthDuration(x), n) if n.is_numeric() => {
            let months = (x.signed_months() as f64 * n.to_double()).round() as i64;
            Ok(V::YearMonthDuration(DurationValue::from_months(months)))
        }
        (BinaryOp::Multiply, n, V::YearMonthDuration(x)) if n.is_numeric() => {
            let months = (x.signed_months() as f64 * n.to_double()).round() as i64;
            Ok(V::YearMonthDuration(DurationValue::from_months(months)))
        }
        (BinaryOp::Multiply, V::DayTimeDuration(x), n) if n.is_numeric() => {
            let factor = Decimal::try_from(n.to_double())
                .map_err(|_| XPathError::type_error("invalid duration multiplier"))?;
            Ok(V::DayTimeDuration(DurationValue::from_seconds(
                x.signed_seconds() * factor,
            )))
        }
        (BinaryOp::Multiply, n, V::DayTimeDuration(x)) if n.is_numeric() => {
            let factor = Decimal::try_from(n.to_double())
                .map_err(|_| XPathError::type_error("invalid duration multiplier"))?;
            Ok(V::DayTimeDuration(DurationValue::from_seconds(
                x.signed_seconds() * factor,
            )))
        }
        (BinaryOp::Divide, V::DayTimeDuration(x), V::DayTimeDuration(y)) => {
            if y.signed_seconds().is_zero() {
                return Err(XPathError::DivisionByZero);
            }
            Ok(V::Decimal(x.signed_seconds() / y.signed_seconds()))
        }
        (BinaryOp::Divide, V::YearMonthDuration(x), V::YearMonthDuration(y)) => {
            if y.signed_months() == 0 {
                return Err(XPathError::DivisionByZero);
            }
            Ok(V::Decimal(
                Decimal::from(x.signed_months()) / Decimal::from(y.signed_months()),
            ))
        }
        (BinaryOp::Divide, V::DayTimeDuration(x), n) if n.is_numeric() => {
            let divisor = Decimal::try_from(n.to_double())
                .map_err(|_| XPathError::type_error("invalid duration divisor"))?;
            if divisor.is_zero() {
                return Err(XPathError::DivisionByZero);
            }
            Ok(V::DayTimeDuration(DurationValue::from_seconds(
                x.signed_seconds() / divisor,
            )))
        }
        (BinaryOp::Divide, V::YearMonthDuration(x), n) if n.is_numeric() => {
            let divisor = n.to_double();
            if divisor == 0.0 {
                return Err(XPathError::DivisionByZero);
            }
            let months = (x.signed_months() as f64 / divisor).round() as i64;
            Ok(V::YearMonthDuration(DurationValue::from_months(months)))
        }

        _ => Err(XPathError::type_mismatch(
            "operands do not support arithmetic",
            a.type_name(),
            b.type_name(),
        )),
    }
}

fn is_duration(value: &AtomicValue) -> bool {
    matches!(
        value,
        AtomicValue::Duration(_)
            | AtomicValue::YearMonthDuration(_)
            | AtomicValue::DayTimeDuration(_)
    )
}

fn signed_duration(value: &AtomicValue, negate: bool) -> (i64, Decimal) {
    let d = match value {
        AtomicValue::Duration(d)
        | AtomicValue::YearMonthDuration(d)
        | AtomicValue::DayTimeDuration(d) => d,
        _ => unreachable!("guarded by is_duration"),
    };
    let (months, seconds) = (d.signed_months(), d.signed_seconds());
    if negate {
        (-months, -seconds)
    } else {
        (months, seconds)
    }
}

fn numeric_arithmetic(op: BinaryOp, a: &AtomicValue, b: &AtomicValue) -> Result<AtomicValue> {
    use AtomicValue as V;

    // double dominates
    if matches!(a, V::Double(_)) || matches!(b, V::Double(_)) {
        let x = a.to_double();
        let y = b.to_double();
        return Ok(match op {
            BinaryOp::Add => V::Double(x + y),
            BinaryOp::Subtract => V::Double(x - y),
            BinaryOp::Multiply => V::Double(x * y),
            BinaryOp::Divide => V::Double(x / y),
            BinaryOp::IntegerDivide => {
                if y == 0.0 {
                    return Err(XPathError::DivisionByZero);
                }
                if x.is_nan() || x.is_infinite() {
                    return Err(XPathError::InvalidLexicalValue(
                        "idiv of a non-finite operand".to_string(),
                    ));
                }
                V::Integer((x / y).trunc() as i64)
            }
            _ => V::Double(x % y),
        });
    }

    // integer × integer stays integer, widening to decimal on overflow
    if let (V::Integer(x), V::Integer(y)) = (a, b) {
        match op {
            BinaryOp::Add => {
                return Ok(match x.checked_add(*y) {
                    Some(n) => V::Integer(n),
                    None => V::Decimal(Decimal::from(*x) + Decimal::from(*y)),
                });
            }
            BinaryOp::Subtract => {
                return Ok(match x.checked_sub(*y) {
                    Some(n) => V::Integer(n),
                    None => V::Decimal(Decimal::from(*x) - Decimal::from(*y)),
                });
            }
            BinaryOp::Multiply => {
                return Ok(match x.checked_mul(*y) {
                    Some(n) => V::Integer(n),
                    None => V::Decimal(Decimal::from(*x) * Decimal::from(*y)),
                });
            }
            BinaryOp::IntegerDivide => {
                if *y == 0 {
                    return Err(XPathError::DivisionByZero);
                }
                return Ok(V::Integer(x.wrapping_div(*y)));
            }
            BinaryOp::Modulo => {
                if *y == 0 {
                    return Err(XPathError::DivisionByZero);
                }
                return Ok(V::Integer(x % y));
            }
            _ => {}
        }
    }

    // decimal arithmetic
    let x = a
        .to_decimal()
        .ok_or_else(|| XPathError::type_error("numeric operand expected"))?;
    let y = b
        .to_decimal()
        .ok_or_else(|| XPathError::type_error("numeric operand expected"))?;
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Subtract => x - y,
        BinaryOp::Multiply => x * y,
        BinaryOp::Divide => {
            if y.is_zero() {
                return Err(XPathError::DivisionByZero);
            }
            x / y
        }
        BinaryOp::IntegerDivide => {
            if y.is_zero() {
                return Err(XPathError::DivisionByZero);
            }
            return Ok(V::Integer((x / y).trunc().to_i64().unwrap_or(0)));
        }
        _ => {
            if y.is_zero() {
                return Err(XPathError::DivisionByZero);
            }
            x % y
        }
    };
    Ok(V::Decimal(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::XmlNode;

    type Ctx<'h> = EvaluationContext<'h, XmlNode>;
    type V = XdmValue<XmlNode>;

    fn run(op: BinaryOp, l: V, r: V) -> V {
        evaluate_binary(op, l, r, &Ctx::new()).unwrap()
    }

    #[test]
    fn integer_division_yields_decimal() {
        let out = run(BinaryOp::Divide, V::from_integer(1), V::from_integer(2));
        assert_eq!(
            out.first().unwrap().as_atomic().unwrap(),
            &AtomicValue::Decimal(Decimal::new(5, 1))
        );
    }

    #[test]
    fn idiv_truncates_toward_zero() {
        let out = run(BinaryOp::IntegerDivide, V::from_integer(-7), V::from_integer(2));
        assert_eq!(out.to_double(), -3.0);
    }

    #[test]
    fn division_by_zero_is_an_error_for_exact_types() {
        let err = evaluate_binary(
            BinaryOp::Divide,
            V::from_integer(1),
            V::from_integer(0),
            &Ctx::new(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "FOAR0001");
        // doubles divide to infinity instead
        let out = run(BinaryOp::Divide, V::from_double(1.0), V::from_double(0.0));
        assert_eq!(out.to_double(), f64::INFINITY);
    }

    #[test]
    fn arithmetic_with_empty_operand_is_empty() {
        let out = run(BinaryOp::Add, V::empty(), V::from_integer(1));
        assert!(out.is_empty());
    }

    #[test]
    fn general_comparison_is_existential() {
        let mut seq = V::from_integer(1);
        seq.extend(V::from_integer(5));
        let out = run(BinaryOp::GeneralEq, seq.clone(), V::from_integer(5));
        assert!(out.effective_boolean_value().unwrap());
        let out = run(BinaryOp::GeneralGt, seq, V::from_integer(10));
        assert!(!out.effective_boolean_value().unwrap());
    }

    #[test]
    fn value_comparison_requires_singletons() {
        let mut seq = V::from_integer(1);
        seq.extend(V::from_integer(2));
        let err =
            evaluate_binary(BinaryOp::ValueEq, seq, V::from_integer(1), &Ctx::new()).unwrap_err();
        assert_eq!(err.code(), "XPTY0004");
    }

    #[test]
    fn datetime_minus_datetime_gives_daytime_duration() {
        let x = AtomicValue::DateTime(
            crate::types::datetime::DateTimeValue::parse("2024-01-02T00:00:00Z").unwrap(),
        );
        let y = AtomicValue::DateTime(
            crate::types::datetime::DateTimeValue::parse("2024-01-01T00:00:00Z").unwrap(),
        );
        let out = run(
            BinaryOp::Subtract,
            V::from_atomic(x),
            V::from_atomic(y),
        );
        assert_eq!(out.to_string_value(), "P1D");
    }

    #[test]
    fn date_plus_year_month_duration() {
        let d = AtomicValue::Date(
            crate::types::datetime::DateValue::parse("2024-01-31").unwrap(),
        );
        let dur = AtomicValue::YearMonthDuration(DurationValue::parse("P1M").unwrap());
        let out = run(BinaryOp::Add, V::from_atomic(d), V::from_atomic(dur));
        assert_eq!(out.to_string_value(), "2024-02-29");
    }

    #[test]
    fn union_orders_and_deduplicates() {
        let tree = stilo_xdm::XmlTree::parse("<r><a/><b/></r>").unwrap();
        let root_el = tree.root().children().next().unwrap();
        let kids: Vec<XmlNode> = root_el.children().collect();
        let l = V::from_nodes(vec![kids[1].clone()]);
        let r = V::from_nodes(vec![kids[0].clone(), kids[1].clone()]);
        let out = run(BinaryOp::Union, l, r);
        assert_eq!(out.len(), 2);
        let orders: Vec<u64> = out
            .iter()
            .map(|i| i.as_node().unwrap().document_order())
            .collect();
        assert!(orders[0] < orders[1]);
    }
}
