//! The `math:` function table.

use stilo_xdm::SourceNode;

use crate::context::EvaluationContext;
use crate::error::Result;
use crate::functions::{ArgType, Table, def, double_arg, optional_atomic_arg};
use crate::types::XdmValue;

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "pi", 0, Some(0), &[], fn_pi);
    def(table, "exp", 1, Some(1), &[ArgType::Numeric], fn_exp);
    def(table, "exp10", 1, Some(1), &[ArgType::Numeric], fn_exp10);
    def(table, "log", 1, Some(1), &[ArgType::Numeric], fn_log);
    def(table, "log10", 1, Some(1), &[ArgType::Numeric], fn_log10);
    def(table, "pow", 2, Some(2), &[ArgType::Numeric, ArgType::Numeric], fn_pow);
    def(table, "sqrt", 1, Some(1), &[ArgType::Numeric], fn_sqrt);
    def(table, "sin", 1, Some(1), &[ArgType::Numeric], fn_sin);
    def(table, "cos", 1, Some(1), &[ArgType::Numeric], fn_cos);
    def(table, "tan", 1, Some(1), &[ArgType::Numeric], fn_tan);
    def(table, "asin", 1, Some(1), &[ArgType::Numeric], fn_asin);
    def(table, "acos", 1, Some(1), &[ArgType::Numeric], fn_acos);
    def(table, "atan", 1, Some(1), &[ArgType::Numeric], fn_atan);
    def(table, "atan2", 2, Some(2), &[ArgType::Numeric, ArgType::Numeric], fn_atan2);
}

pub fn fn_pi<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_double(std::f64::consts::PI))
}

macro_rules! unary_math {
    ($name:ident, $op:expr) => {
        pub fn $name<N: SourceNode>(
            args: Vec<XdmValue<N>>,
            _ctx: &EvaluationContext<'_, N>,
        ) -> Result<XdmValue<N>> {
            match optional_atomic_arg(&args, 0)? {
                None => Ok(XdmValue::empty()),
                Some(value) => {
                    let f: fn(f64) -> f64 = $op;
                    Ok(XdmValue::from_double(f(value.to_double())))
                }
            }
        }
    };
}

unary_math!(fn_exp, f64::exp);
unary_math!(fn_exp10, |x| 10f64.powf(x));
unary_math!(fn_log, f64::ln);
unary_math!(fn_log10, f64::log10);
unary_math!(fn_sqrt, f64::sqrt);
unary_math!(fn_sin, f64::sin);
unary_math!(fn_cos, f64::cos);
unary_math!(fn_tan, f64::tan);
unary_math!(fn_asin, f64::asin);
unary_math!(fn_acos, f64::acos);
unary_math!(fn_atan, f64::atan);

pub fn fn_pow<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() {
        return Ok(XdmValue::empty());
    }
    Ok(XdmValue::from_double(
        double_arg(&args, 0).powf(double_arg(&args, 1)),
    ))
}

pub fn fn_atan2<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_double(
        double_arg(&args, 0).atan2(double_arg(&args, 1)),
    ))
}

#[cfg(test)]
mod tests {
    use crate::engine::evaluate;
    use crate::parser::parse_expression;
    use crate::types::XdmValue;
    use stilo_xdm::XmlNode;

    fn eval(expr: &str) -> XdmValue<XmlNode> {
        evaluate(
            &parse_expression(expr).unwrap(),
            &crate::context::EvaluationContext::new(),
        )
        .unwrap()
    }

    #[test]
    fn math_table_routes_by_namespace() {
        assert!((eval("math:pi()").to_double() - std::f64::consts::PI).abs() < 1e-12);
        assert_eq!(eval("math:pow(2, 10)").to_double(), 1024.0);
        assert_eq!(eval("math:sqrt(81)").to_double(), 9.0);
        assert!(eval("math:log(0)").to_double().is_infinite());
    }
}
