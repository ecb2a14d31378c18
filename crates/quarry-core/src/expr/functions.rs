//! Math function table injected by the in-memory driver

use super::ast::FunctionLookup;
use crate::errors::{QuarryError, Result};
use crate::value::{Row, Value};

/// Case-insensitive table of numeric functions.
///
/// Arguments are read as numbers; anything non-numeric becomes NaN.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathFunctions;

impl MathFunctions {
    pub const NAMES: &'static [&'static str] = &[
        "abs", "acos", "asin", "atan", "atan2", "ceil", "cos", "exp", "floor", "log", "max", "min",
        "pow", "round", "sin", "sqrt", "tan",
    ];

    pub fn apply(name: &str, args: &[f64]) -> Option<f64> {
        let arg = |i: usize| args.get(i).copied().unwrap_or(f64::NAN);
        let result = match name.to_ascii_lowercase().as_str() {
            "abs" => arg(0).abs(),
            "acos" => arg(0).acos(),
            "asin" => arg(0).asin(),
            "atan" => arg(0).atan(),
            "atan2" => arg(0).atan2(arg(1)),
            "ceil" => arg(0).ceil(),
            "cos" => arg(0).cos(),
            "exp" => arg(0).exp(),
            "floor" => arg(0).floor(),
            "log" => arg(0).ln(),
            "max" => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            "min" => args.iter().copied().fold(f64::INFINITY, f64::min),
            "pow" => arg(0).powf(arg(1)),
            // half-way cases round towards positive infinity
            "round" => (arg(0) + 0.5).floor(),
            "sin" => arg(0).sin(),
            "sqrt" => arg(0).sqrt(),
            "tan" => arg(0).tan(),
            _ => return None,
        };
        Some(result)
    }
}

impl FunctionLookup for MathFunctions {
    fn call(&self, name: &str, _row: &Row, args: &[Value]) -> Result<Value> {
        let numbers: Vec<f64> = args
            .iter()
            .map(|v| v.as_f64().unwrap_or(f64::NAN))
            .collect();
        MathFunctions::apply(name, &numbers)
            .map(number_value)
            .ok_or_else(|| QuarryError::UnknownFunction {
                name: name.to_string(),
            })
    }
}

fn number_value(x: f64) -> Value {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 9.0e15 {
        Value::Int(x as i64)
    } else {
        Value::Float(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_name_resolves() {
        for name in MathFunctions::NAMES {
            assert!(MathFunctions::apply(name, &[1.0, 2.0]).is_some(), "{}", name);
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(MathFunctions::apply("ABS", &[-3.0]), Some(3.0));
    }

    #[test]
    fn test_integral_results_are_ints() {
        let value = MathFunctions.call("pow", &Row::new(), &[Value::Int(2), Value::Int(10)]).unwrap();
        assert_eq!(value, Value::Int(1024));
        let value = MathFunctions.call("sqrt", &Row::new(), &[Value::Int(2)]).unwrap();
        assert!(matches!(value, Value::Float(_)));
    }

    #[test]
    fn test_unknown_name_is_error() {
        let err = MathFunctions.call("frobnicate", &Row::new(), &[]).unwrap_err();
        assert_eq!(
            err,
            QuarryError::UnknownFunction {
                name: "frobnicate".to_string()
            }
        );
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(MathFunctions::apply("round", &[2.5]), Some(3.0));
        assert_eq!(MathFunctions::apply("round", &[-2.5]), Some(-2.0));
    }
}
