//! Evaluation of type-checked nodes.

use crate::ast::BinaryOp;
use crate::compile::{Node, NodeKind};
use crate::error::{ExpressionError, Result};
use crate::functions;
use crate::types::Value;
use crate::VariableSource;

fn internal(what: &str, a: Value, b: Value) -> ExpressionError {
    ExpressionError::evaluation(format!(
        "{what} on mismatched operands {} and {}",
        a.value_type(),
        b.value_type()
    ))
}

macro_rules! int_arith {
    ($op:expr, $x:expr, $y:expr) => {
        match $op {
            BinaryOp::Add => $x.wrapping_add($y),
            BinaryOp::Sub => $x.wrapping_sub($y),
            BinaryOp::Mul => $x.wrapping_mul($y),
            BinaryOp::Div | BinaryOp::Rem if $y == 0 => {
                return Err(ExpressionError::DivisionByZero)
            }
            BinaryOp::Div => $x.wrapping_div($y),
            BinaryOp::Rem => $x.wrapping_rem($y),
            other => {
                return Err(ExpressionError::evaluation(format!(
                    "'{}' is not arithmetic",
                    other.symbol()
                )))
            }
        }
    };
}

macro_rules! float_arith {
    ($op:expr, $x:expr, $y:expr) => {
        match $op {
            BinaryOp::Add => $x + $y,
            BinaryOp::Sub => $x - $y,
            BinaryOp::Mul => $x * $y,
            BinaryOp::Div => $x / $y,
            BinaryOp::Rem => $x % $y,
            other => {
                return Err(ExpressionError::evaluation(format!(
                    "'{}' is not arithmetic",
                    other.symbol()
                )))
            }
        }
    };
}

fn arith(op: BinaryOp, a: Value, b: Value) -> Result<Value> {
    Ok(match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(int_arith!(op, x, y)),
        (Value::Long(x), Value::Long(y)) => Value::Long(int_arith!(op, x, y)),
        (Value::Float(x), Value::Float(y)) => Value::Float(float_arith!(op, x, y)),
        (Value::Double(x), Value::Double(y)) => Value::Double(float_arith!(op, x, y)),
        _ => return Err(internal("arithmetic", a, b)),
    })
}

fn shift(op: BinaryOp, a: Value, b: Value) -> Result<Value> {
    let distance = b.as_i64() as u32;
    Ok(match a {
        Value::Int(x) => Value::Int(match op {
            BinaryOp::Shl => x.wrapping_shl(distance),
            BinaryOp::Shr => x.wrapping_shr(distance),
            _ => (x as u32).wrapping_shr(distance) as i32,
        }),
        Value::Long(x) => Value::Long(match op {
            BinaryOp::Shl => x.wrapping_shl(distance),
            BinaryOp::Shr => x.wrapping_shr(distance),
            _ => (x as u64).wrapping_shr(distance) as i64,
        }),
        _ => return Err(internal("shift", a, b)),
    })
}

fn ordered<T: PartialOrd>(op: BinaryOp, x: T, y: T) -> bool {
    match op {
        BinaryOp::Lt => x < y,
        BinaryOp::Le => x <= y,
        BinaryOp::Gt => x > y,
        BinaryOp::Ge => x >= y,
        BinaryOp::Eq => x == y,
        _ => x != y,
    }
}

fn compare(op: BinaryOp, a: Value, b: Value) -> Result<bool> {
    Ok(match (a, b) {
        (Value::Boolean(x), Value::Boolean(y)) => match op {
            BinaryOp::Eq => x == y,
            BinaryOp::Ne => x != y,
            _ => return Err(internal("ordering", a, b)),
        },
        (Value::Int(x), Value::Int(y)) => ordered(op, x, y),
        (Value::Long(x), Value::Long(y)) => ordered(op, x, y),
        (Value::Float(x), Value::Float(y)) => ordered(op, x, y),
        (Value::Double(x), Value::Double(y)) => ordered(op, x, y),
        _ => return Err(internal("comparison", a, b)),
    })
}

macro_rules! bits {
    ($op:expr, $x:expr, $y:expr) => {
        match $op {
            BinaryOp::BitAnd => $x & $y,
            BinaryOp::BitOr => $x | $y,
            _ => $x ^ $y,
        }
    };
}

fn bitwise(op: BinaryOp, a: Value, b: Value) -> Result<Value> {
    Ok(match (a, b) {
        (Value::Boolean(x), Value::Boolean(y)) => Value::Boolean(bits!(op, x, y)),
        (Value::Int(x), Value::Int(y)) => Value::Int(bits!(op, x, y)),
        (Value::Long(x), Value::Long(y)) => Value::Long(bits!(op, x, y)),
        _ => return Err(internal("bitwise operation", a, b)),
    })
}

impl Node {
    pub fn eval(&self, source: &dyn VariableSource) -> Result<Value> {
        match &self.kind {
            NodeKind::Const(value) => Ok(*value),
            NodeKind::Var(index) => {
                let value = source.value(*index);
                Ok(if value.value_type() == self.ty {
                    value
                } else {
                    value.cast(self.ty)
                })
            }
            NodeKind::Cast(operand) => Ok(operand.eval(source)?.cast(self.ty)),
            NodeKind::Neg(operand) => Ok(match operand.eval(source)? {
                Value::Int(v) => Value::Int(v.wrapping_neg()),
                Value::Long(v) => Value::Long(v.wrapping_neg()),
                Value::Float(v) => Value::Float(-v),
                other => Value::Double(-other.as_f64()),
            }),
            NodeKind::Not(operand) => Ok(Value::Boolean(!operand.eval(source)?.as_bool())),
            NodeKind::BitNot(operand) => Ok(match operand.eval(source)? {
                Value::Long(v) => Value::Long(!v),
                other => Value::Int(!(other.as_i64() as i32)),
            }),
            NodeKind::Arith(op, lhs, rhs) => arith(*op, lhs.eval(source)?, rhs.eval(source)?),
            NodeKind::Shift(op, lhs, rhs) => shift(*op, lhs.eval(source)?, rhs.eval(source)?),
            NodeKind::Compare(op, lhs, rhs) => Ok(Value::Boolean(compare(
                *op,
                lhs.eval(source)?,
                rhs.eval(source)?,
            )?)),
            NodeKind::Bitwise(op, lhs, rhs) => bitwise(*op, lhs.eval(source)?, rhs.eval(source)?),
            NodeKind::And(lhs, rhs) => Ok(Value::Boolean(
                lhs.eval(source)?.as_bool() && rhs.eval(source)?.as_bool(),
            )),
            NodeKind::Or(lhs, rhs) => Ok(Value::Boolean(
                lhs.eval(source)?.as_bool() || rhs.eval(source)?.as_bool(),
            )),
            NodeKind::Conditional(cond, then, otherwise) => {
                if cond.eval(source)?.as_bool() {
                    then.eval(source)
                } else {
                    otherwise.eval(source)
                }
            }
            NodeKind::Call(builtin, args) => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(source))
                    .collect::<Result<Vec<_>>>()?;
                functions::call(*builtin, &args)
            }
        }
    }
}
