//! Built-in function library for compiled expressions.
//!
//! Covers the usual `java.lang.Math` style set plus a few extras used by
//! gridded data work: inverse hyperbolics, variadic `sum`, `isNaN`,
//! great-circle `dist`, and the `indexOfMin` / `indexOfMax` / `getValue`
//! trio for picking values out of a list of variables.

use crate::error::{ExpressionError, Result};
use crate::types::{Value, ValueType};

/// Mean earth radius in kilometres used by `dist`.
pub const EARTH_RADIUS_KM: f64 = 6370.997;

type Math1 = fn(f64) -> f64;
type Math2 = fn(f64, f64) -> f64;

const MATH1: &[(&str, Math1)] = &[
    ("acos", f64::acos),
    ("asin", f64::asin),
    ("atan", f64::atan),
    ("cbrt", f64::cbrt),
    ("ceil", f64::ceil),
    ("cos", f64::cos),
    ("cosh", f64::cosh),
    ("exp", f64::exp),
    ("expm1", f64::exp_m1),
    ("floor", f64::floor),
    ("log", f64::ln),
    ("log10", f64::log10),
    ("log1p", f64::ln_1p),
    ("rint", f64::round_ties_even),
    ("sin", f64::sin),
    ("sinh", f64::sinh),
    ("sqrt", f64::sqrt),
    ("tan", f64::tan),
    ("tanh", f64::tanh),
    ("toDegrees", f64::to_degrees),
    ("toRadians", f64::to_radians),
    ("asinh", asinh),
    ("acosh", acosh),
    ("atanh", atanh),
];

const MATH2: &[(&str, Math2)] = &[
    ("atan2", f64::atan2),
    ("hypot", f64::hypot),
    ("pow", f64::powf),
];

fn asinh(x: f64) -> f64 {
    (x + (x * x + 1.0).sqrt()).ln()
}

fn acosh(x: f64) -> f64 {
    (x + (x * x - 1.0).sqrt()).ln()
}

fn atanh(x: f64) -> f64 {
    0.5 * ((x + 1.0) / (x - 1.0)).ln()
}

/// Great circle distance in kilometres between two points given in degrees.
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Builtin {
    Math1(&'static str, Math1),
    Math2(&'static str, Math2),
    Abs,
    Max,
    Min,
    Signum,
    Round,
    Random,
    IsNaN,
    Sum,
    Dist,
    IndexOfMin,
    IndexOfMax,
    GetValue,
}

/// A resolved call: the function, the types its arguments are cast to,
/// and its result type.
#[derive(Debug, Clone)]
pub(crate) struct Signature {
    pub builtin: Builtin,
    pub params: Vec<ValueType>,
    pub result: ValueType,
}

/// Why a call could not be resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResolveError {
    Unknown,
    Arity(String),
    Type(String),
}

fn numeric_args(name: &str, args: &[ValueType]) -> std::result::Result<(), ResolveError> {
    match args.iter().find(|t| !t.is_numeric()) {
        Some(t) => Err(ResolveError::Type(format!(
            "function '{name}' cannot take a {t} argument"
        ))),
        None => Ok(()),
    }
}

fn arity(args: &[ValueType], expected: usize) -> std::result::Result<(), ResolveError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ResolveError::Arity(expected.to_string()))
    }
}

/// Pick the overload of `name` that accepts arguments of the given types.
pub(crate) fn resolve(name: &str, args: &[ValueType]) -> std::result::Result<Signature, ResolveError> {
    use ValueType::*;

    let signature = |builtin, params: Vec<ValueType>, result| Signature {
        builtin,
        params,
        result,
    };

    if let Some(&(name, f)) = MATH1.iter().find(|(n, _)| *n == name) {
        arity(args, 1)?;
        numeric_args(name, args)?;
        return Ok(signature(Builtin::Math1(name, f), vec![Double], Double));
    }
    if let Some(&(name, f)) = MATH2.iter().find(|(n, _)| *n == name) {
        arity(args, 2)?;
        numeric_args(name, args)?;
        return Ok(signature(Builtin::Math2(name, f), vec![Double, Double], Double));
    }

    match name {
        "abs" => {
            arity(args, 1)?;
            numeric_args(name, args)?;
            let ty = args[0].unary_promote().unwrap_or(Double);
            Ok(signature(Builtin::Abs, vec![ty], ty))
        }
        "max" | "min" => {
            arity(args, 2)?;
            numeric_args(name, args)?;
            let ty = ValueType::binary_promote(args[0], args[1]).unwrap_or(Double);
            let builtin = if name == "max" { Builtin::Max } else { Builtin::Min };
            Ok(signature(builtin, vec![ty, ty], ty))
        }
        "signum" => {
            arity(args, 1)?;
            numeric_args(name, args)?;
            let ty = if args[0] == Float { Float } else { Double };
            Ok(signature(Builtin::Signum, vec![ty], ty))
        }
        "round" => {
            arity(args, 1)?;
            numeric_args(name, args)?;
            if matches!(args[0], Long | Double) {
                Ok(signature(Builtin::Round, vec![Double], Long))
            } else {
                Ok(signature(Builtin::Round, vec![Float], Int))
            }
        }
        "random" => {
            arity(args, 0)?;
            Ok(signature(Builtin::Random, vec![], Double))
        }
        "isNaN" => {
            arity(args, 1)?;
            numeric_args(name, args)?;
            Ok(signature(Builtin::IsNaN, vec![Double], Boolean))
        }
        "sum" => {
            numeric_args(name, args)?;
            Ok(signature(Builtin::Sum, vec![Double; args.len()], Double))
        }
        "dist" => {
            arity(args, 4)?;
            numeric_args(name, args)?;
            Ok(signature(Builtin::Dist, vec![Double; 4], Double))
        }
        "indexOfMin" | "indexOfMax" => {
            if args.is_empty() {
                return Err(ResolveError::Arity("at least 1".to_string()));
            }
            numeric_args(name, args)?;
            let builtin = if name == "indexOfMin" {
                Builtin::IndexOfMin
            } else {
                Builtin::IndexOfMax
            };
            Ok(signature(builtin, vec![Double; args.len()], Int))
        }
        "getValue" => {
            if args.len() < 2 {
                return Err(ResolveError::Arity("at least 2".to_string()));
            }
            numeric_args(name, args)?;
            if !args[0].is_integral() {
                return Err(ResolveError::Type(
                    "getValue index must be an integer".to_string(),
                ));
            }
            let mut params = vec![Int];
            params.extend(std::iter::repeat(Double).take(args.len() - 1));
            Ok(signature(Builtin::GetValue, params, Double))
        }
        _ => Err(ResolveError::Unknown),
    }
}

fn doubles(args: &[Value]) -> impl Iterator<Item = f64> + '_ {
    args.iter().map(Value::as_f64)
}

/// Evaluate a resolved call on arguments already cast to the parameter types.
pub(crate) fn call(builtin: Builtin, args: &[Value]) -> Result<Value> {
    let arg = |i: usize| -> Result<Value> {
        args.get(i)
            .copied()
            .ok_or_else(|| ExpressionError::evaluation("missing function argument"))
    };

    let value = match builtin {
        Builtin::Math1(_, f) => Value::Double(f(arg(0)?.as_f64())),
        Builtin::Math2(_, f) => Value::Double(f(arg(0)?.as_f64(), arg(1)?.as_f64())),
        Builtin::Abs => match arg(0)? {
            Value::Int(v) => Value::Int(v.wrapping_abs()),
            Value::Long(v) => Value::Long(v.wrapping_abs()),
            Value::Float(v) => Value::Float(v.abs()),
            other => Value::Double(other.as_f64().abs()),
        },
        Builtin::Max | Builtin::Min => {
            let max = matches!(builtin, Builtin::Max);
            match (arg(0)?, arg(1)?) {
                (Value::Int(a), Value::Int(b)) => Value::Int(if max { a.max(b) } else { a.min(b) }),
                (Value::Long(a), Value::Long(b)) => Value::Long(if max { a.max(b) } else { a.min(b) }),
                (Value::Float(a), Value::Float(b)) => Value::Float(float_extreme(a as f64, b as f64, max) as f32),
                (a, b) => Value::Double(float_extreme(a.as_f64(), b.as_f64(), max)),
            }
        }
        Builtin::Signum => match arg(0)? {
            Value::Float(v) => Value::Float(signum(v as f64) as f32),
            other => Value::Double(signum(other.as_f64())),
        },
        Builtin::Round => match arg(0)? {
            Value::Float(v) => Value::Int((v + 0.5).floor() as i32),
            other => Value::Long((other.as_f64() + 0.5).floor() as i64),
        },
        Builtin::Random => Value::Double(rand::random::<f64>()),
        Builtin::IsNaN => Value::Boolean(arg(0)?.as_f64().is_nan()),
        Builtin::Sum => Value::Double(doubles(args).sum()),
        Builtin::Dist => Value::Double(great_circle_distance(
            arg(0)?.as_f64(),
            arg(1)?.as_f64(),
            arg(2)?.as_f64(),
            arg(3)?.as_f64(),
        )),
        Builtin::IndexOfMin => Value::Int(index_of(args, |v, best| v < best, f64::MAX)),
        Builtin::IndexOfMax => Value::Int(index_of(args, |v, best| v > best, -f64::MAX)),
        Builtin::GetValue => {
            let index = arg(0)?.as_i64();
            if index == -1 {
                Value::Double(f64::NAN)
            } else {
                let picked = usize::try_from(index)
                    .ok()
                    .and_then(|i| args.get(i + 1))
                    .ok_or_else(|| {
                        ExpressionError::evaluation(format!(
                            "getValue index {index} is outside 0..{}",
                            args.len() - 1
                        ))
                    })?;
                Value::Double(picked.as_f64())
            }
        }
    };
    Ok(value)
}

/// Max or min where NaN in either argument gives NaN.
fn float_extreme(a: f64, b: f64, max: bool) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if max {
        a.max(b)
    } else {
        a.min(b)
    }
}

fn signum(v: f64) -> f64 {
    if v == 0.0 || v.is_nan() {
        v
    } else {
        v.signum()
    }
}

/// Index of the first value beating every earlier one, or -1 when all are NaN.
fn index_of(args: &[Value], better: impl Fn(f64, f64) -> bool, start: f64) -> i32 {
    let mut best = start;
    let mut index = -1;
    for (i, v) in doubles(args).enumerate() {
        if better(v, best) {
            best = v;
            index = i as i32;
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_overloads() {
        let sig = resolve("abs", &[ValueType::Short]).unwrap();
        assert_eq!(sig.result, ValueType::Int);
        let sig = resolve("max", &[ValueType::Int, ValueType::Float]).unwrap();
        assert_eq!(sig.params, vec![ValueType::Float, ValueType::Float]);
        let sig = resolve("round", &[ValueType::Double]).unwrap();
        assert_eq!(sig.result, ValueType::Long);
        let sig = resolve("round", &[ValueType::Float]).unwrap();
        assert_eq!(sig.result, ValueType::Int);
    }

    #[test]
    fn test_resolve_errors() {
        assert_eq!(resolve("nosuch", &[]).unwrap_err(), ResolveError::Unknown);
        assert!(matches!(resolve("sin", &[]), Err(ResolveError::Arity(_))));
        assert!(matches!(
            resolve("sqrt", &[ValueType::Boolean]),
            Err(ResolveError::Type(_))
        ));
        assert!(matches!(
            resolve("getValue", &[ValueType::Double, ValueType::Double]),
            Err(ResolveError::Type(_))
        ));
    }

    #[test]
    fn test_inverse_hyperbolics() {
        assert!((asinh(1.0) - 1.0f64.asinh()).abs() < 1e-12);
        assert!((acosh(2.0) - 2.0f64.acosh()).abs() < 1e-12);
        // this form of atanh is the real part for |x| > 1
        assert!((atanh(3.0) - 0.5 * (4.0f64 / 2.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_dist_quarter_meridian() {
        let d = great_circle_distance(0.0, 0.0, 90.0, 0.0);
        assert!((d - EARTH_RADIUS_KM * std::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_index_and_get_value() {
        let args = [Value::Double(3.0), Value::Double(f64::NAN), Value::Double(1.0)];
        assert_eq!(call(Builtin::IndexOfMin, &args).unwrap(), Value::Int(2));
        assert_eq!(call(Builtin::IndexOfMax, &args).unwrap(), Value::Int(0));
        let nan = [Value::Double(f64::NAN)];
        assert_eq!(call(Builtin::IndexOfMin, &nan).unwrap(), Value::Int(-1));

        let picked = call(
            Builtin::GetValue,
            &[Value::Int(1), Value::Double(5.0), Value::Double(6.0)],
        )
        .unwrap();
        assert_eq!(picked, Value::Double(6.0));
        let none = call(Builtin::GetValue, &[Value::Int(-1), Value::Double(5.0)]).unwrap();
        assert!(none.as_f64().is_nan());
        assert!(call(Builtin::GetValue, &[Value::Int(4), Value::Double(5.0)]).is_err());
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(call(Builtin::Round, &[Value::Double(-2.5)]).unwrap(), Value::Long(-2));
        assert_eq!(call(Builtin::Round, &[Value::Float(2.5)]).unwrap(), Value::Int(3));
    }
}
