//! Type checking and lowering of syntax trees into evaluable nodes.
//!
//! Every node carries its static type. Operands of arithmetic and
//! comparison operators are wrapped in explicit casts to their promoted
//! type here, so evaluation never has to reason about mixed types.

use crate::ast::{BinaryOp, Expr, ExprKind, Literal, UnaryOp};
use crate::error::{ExpressionError, Location, Result};
use crate::functions::{self, Builtin, ResolveError};
use crate::types::{Value, ValueType};
use crate::{Variable, VariableResolver};

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub ty: ValueType,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Const(Value),
    /// Index into the variable source.
    Var(usize),
    /// Convert the operand to this node's type.
    Cast(Box<Node>),
    Neg(Box<Node>),
    Not(Box<Node>),
    BitNot(Box<Node>),
    /// `+ - * / %` on operands of this node's type.
    Arith(BinaryOp, Box<Node>, Box<Node>),
    /// `<< >> >>>` with an int shift distance.
    Shift(BinaryOp, Box<Node>, Box<Node>),
    /// Comparison of two operands sharing a type.
    Compare(BinaryOp, Box<Node>, Box<Node>),
    /// `& ^ |` on two integers or two booleans.
    Bitwise(BinaryOp, Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Conditional(Box<Node>, Box<Node>, Box<Node>),
    Call(Builtin, Vec<Node>),
}

impl Node {
    fn new(ty: ValueType, kind: NodeKind) -> Self {
        Self { ty, kind }
    }

    fn constant(value: Value) -> Self {
        Self::new(value.value_type(), NodeKind::Const(value))
    }

    /// Wrap in a cast unless already of type `ty`; constants fold.
    pub fn coerce(self, ty: ValueType) -> Self {
        if self.ty == ty {
            return self;
        }
        match self.kind {
            NodeKind::Const(value) => Self::constant(value.cast(ty)),
            kind => Self::new(ty, NodeKind::Cast(Box::new(Self { ty: self.ty, kind }))),
        }
    }
}

/// Named constants available in the modern grammar.
fn constant(name: &str) -> Option<Value> {
    match name {
        "PI" => Some(Value::Double(std::f64::consts::PI)),
        "E" => Some(Value::Double(std::f64::consts::E)),
        "NaN" => Some(Value::Double(f64::NAN)),
        _ => None,
    }
}

pub(crate) struct Compiler<'a> {
    src: &'a str,
    resolver: &'a mut dyn VariableResolver,
    variables: Vec<Variable>,
}

impl<'a> Compiler<'a> {
    pub fn new(src: &'a str, resolver: &'a mut dyn VariableResolver) -> Self {
        Self {
            src,
            resolver,
            variables: Vec::new(),
        }
    }

    /// Variables referenced so far, in order of first appearance.
    pub fn into_variables(self) -> Vec<Variable> {
        self.variables
    }

    fn type_error(&self, message: impl Into<String>, offset: usize) -> ExpressionError {
        ExpressionError::type_error(message, self.src, offset)
    }

    fn location(&self, offset: usize) -> Location {
        Location::new(self.src, offset)
    }

    pub fn compile(&mut self, expr: &Expr) -> Result<Node> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(Node::constant(match *literal {
                Literal::Boolean(v) => Value::Boolean(v),
                Literal::Int(v) => Value::Int(v),
                Literal::Long(v) => Value::Long(v),
                Literal::Float(v) => Value::Float(v),
                Literal::Double(v) => Value::Double(v),
            })),
            ExprKind::Ident(name) => self.identifier(name, expr.offset),
            ExprKind::Unary(op, operand) => self.unary(*op, operand, expr.offset),
            ExprKind::Cast(ty, operand) => {
                let node = self.compile(operand)?;
                if node.ty.is_numeric() != ty.is_numeric() {
                    return Err(self.type_error(
                        format!("cannot cast {} to {}", node.ty, ty),
                        expr.offset,
                    ));
                }
                Ok(node.coerce(*ty))
            }
            ExprKind::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, expr.offset),
            ExprKind::Conditional(cond, then, otherwise) => {
                let cond = self.compile(cond)?;
                if cond.ty != ValueType::Boolean {
                    return Err(self.type_error(
                        format!("condition must be boolean, found {}", cond.ty),
                        expr.offset,
                    ));
                }
                let then = self.compile(then)?;
                let otherwise = self.compile(otherwise)?;
                let ty = if then.ty == ValueType::Boolean && otherwise.ty == ValueType::Boolean {
                    ValueType::Boolean
                } else {
                    ValueType::binary_promote(then.ty, otherwise.ty).ok_or_else(|| {
                        self.type_error(
                            format!(
                                "conditional branches have incompatible types {} and {}",
                                then.ty, otherwise.ty
                            ),
                            expr.offset,
                        )
                    })?
                };
                Ok(Node::new(
                    ty,
                    NodeKind::Conditional(
                        Box::new(cond),
                        Box::new(then.coerce(ty)),
                        Box::new(otherwise.coerce(ty)),
                    ),
                ))
            }
            ExprKind::Call(name, args) => self.call(name, args, expr.offset),
        }
    }

    fn identifier(&mut self, name: &str, offset: usize) -> Result<Node> {
        if let Some(value) = constant(name) {
            return Ok(Node::constant(value));
        }
        if let Some(var) = self.variables.iter().find(|v| v.name == name) {
            return Ok(Node::new(var.value_type, NodeKind::Var(var.index)));
        }
        let Some((index, value_type)) = self.resolver.resolve(name) else {
            return Err(ExpressionError::UnresolvedVariable {
                name: name.to_string(),
                location: self.location(offset),
            });
        };
        if !value_type.is_numeric() {
            return Err(self.type_error(
                format!("variable '{name}' must be numeric, found {value_type}"),
                offset,
            ));
        }
        tracing::trace!(name, index, ty = %value_type, "Bound expression variable");
        self.variables.push(Variable {
            name: name.to_string(),
            index,
            value_type,
        });
        Ok(Node::new(value_type, NodeKind::Var(index)))
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr, offset: usize) -> Result<Node> {
        let node = self.compile(operand)?;
        match op {
            UnaryOp::Neg => {
                let ty = node.ty.unary_promote().ok_or_else(|| {
                    self.type_error(format!("cannot negate a {}", node.ty), offset)
                })?;
                Ok(match node.coerce(ty) {
                    Node {
                        kind: NodeKind::Const(value),
                        ..
                    } => Node::constant(negate(value)),
                    node => Node::new(ty, NodeKind::Neg(Box::new(node))),
                })
            }
            UnaryOp::Not => {
                if node.ty != ValueType::Boolean {
                    return Err(self.type_error(
                        format!("operator '!' requires a boolean, found {}", node.ty),
                        offset,
                    ));
                }
                Ok(Node::new(ValueType::Boolean, NodeKind::Not(Box::new(node))))
            }
            UnaryOp::BitNot => {
                if !node.ty.is_integral() {
                    return Err(self.type_error(
                        format!("operator '~' requires an integer, found {}", node.ty),
                        offset,
                    ));
                }
                let ty = node.ty.unary_promote().unwrap_or(ValueType::Int);
                Ok(Node::new(ty, NodeKind::BitNot(Box::new(node.coerce(ty)))))
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, offset: usize) -> Result<Node> {
        let lhs = self.compile(lhs)?;
        let rhs = self.compile(rhs)?;
        let mismatch = |compiler: &Self| {
            compiler.type_error(
                format!(
                    "operator '{}' cannot be applied to {} and {}",
                    op.symbol(),
                    lhs.ty,
                    rhs.ty
                ),
                offset,
            )
        };

        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let ty = ValueType::binary_promote(lhs.ty, rhs.ty).ok_or_else(|| mismatch(self))?;
                Ok(Node::new(
                    ty,
                    NodeKind::Arith(op, Box::new(lhs.coerce(ty)), Box::new(rhs.coerce(ty))),
                ))
            }
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => {
                if !lhs.ty.is_integral() || !rhs.ty.is_integral() {
                    return Err(self.type_error(
                        format!(
                            "shift operator '{}' requires integer operands, found {} and {}",
                            op.symbol(),
                            lhs.ty,
                            rhs.ty
                        ),
                        offset,
                    ));
                }
                let ty = lhs.ty.unary_promote().unwrap_or(ValueType::Int);
                Ok(Node::new(
                    ty,
                    NodeKind::Shift(
                        op,
                        Box::new(lhs.coerce(ty)),
                        Box::new(rhs.coerce(ValueType::Int)),
                    ),
                ))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ty = ValueType::binary_promote(lhs.ty, rhs.ty).ok_or_else(|| mismatch(self))?;
                Ok(Node::new(
                    ValueType::Boolean,
                    NodeKind::Compare(op, Box::new(lhs.coerce(ty)), Box::new(rhs.coerce(ty))),
                ))
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let ty = if lhs.ty == ValueType::Boolean && rhs.ty == ValueType::Boolean {
                    ValueType::Boolean
                } else {
                    ValueType::binary_promote(lhs.ty, rhs.ty).ok_or_else(|| mismatch(self))?
                };
                Ok(Node::new(
                    ValueType::Boolean,
                    NodeKind::Compare(op, Box::new(lhs.coerce(ty)), Box::new(rhs.coerce(ty))),
                ))
            }
            BinaryOp::BitAnd | BinaryOp::BitXor | BinaryOp::BitOr => {
                let ty = if lhs.ty == ValueType::Boolean && rhs.ty == ValueType::Boolean {
                    ValueType::Boolean
                } else if lhs.ty.is_integral() && rhs.ty.is_integral() {
                    ValueType::binary_promote(lhs.ty, rhs.ty).unwrap_or(ValueType::Long)
                } else {
                    return Err(self.type_error(
                        format!(
                            "bitwise operator '{}' requires integer operands, found {} and {}",
                            op.symbol(),
                            lhs.ty,
                            rhs.ty
                        ),
                        offset,
                    ));
                };
                Ok(Node::new(
                    ty,
                    NodeKind::Bitwise(op, Box::new(lhs.coerce(ty)), Box::new(rhs.coerce(ty))),
                ))
            }
            BinaryOp::And | BinaryOp::Or => {
                if lhs.ty != ValueType::Boolean || rhs.ty != ValueType::Boolean {
                    return Err(mismatch(self));
                }
                let kind = if op == BinaryOp::And {
                    NodeKind::And(Box::new(lhs), Box::new(rhs))
                } else {
                    NodeKind::Or(Box::new(lhs), Box::new(rhs))
                };
                Ok(Node::new(ValueType::Boolean, kind))
            }
        }
    }

    fn call(&mut self, name: &str, args: &[Expr], offset: usize) -> Result<Node> {
        let args = args
            .iter()
            .map(|arg| self.compile(arg))
            .collect::<Result<Vec<_>>>()?;
        let types: Vec<ValueType> = args.iter().map(|a| a.ty).collect();
        let signature = functions::resolve(name, &types).map_err(|e| match e {
            ResolveError::Unknown => ExpressionError::UnknownFunction {
                name: name.to_string(),
                location: self.location(offset),
            },
            ResolveError::Arity(expected) => ExpressionError::Arity {
                name: name.to_string(),
                expected,
                found: args.len(),
                location: self.location(offset),
            },
            ResolveError::Type(message) => self.type_error(message, offset),
        })?;
        let args = args
            .into_iter()
            .zip(&signature.params)
            .map(|(arg, ty)| arg.coerce(*ty))
            .collect();
        Ok(Node::new(signature.result, NodeKind::Call(signature.builtin, args)))
    }
}

fn negate(value: Value) -> Value {
    match value {
        Value::Int(v) => Value::Int(v.wrapping_neg()),
        Value::Long(v) => Value::Long(v.wrapping_neg()),
        Value::Float(v) => Value::Float(-v),
        other => Value::Double(-other.as_f64()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::VariableTable;

    fn compile(src: &str) -> Result<Node> {
        let mut table = VariableTable::new();
        table.insert("b", ValueType::Byte);
        table.insert("s", ValueType::Short);
        table.insert("i", ValueType::Int);
        table.insert("l", ValueType::Long);
        table.insert("f", ValueType::Float);
        table.insert("d", ValueType::Double);
        let expr = parse(src)?;
        let mut compiler = Compiler::new(src, &mut table);
        compiler.compile(&expr)
    }

    #[test]
    fn test_result_types() {
        assert_eq!(compile("b + s").unwrap().ty, ValueType::Int);
        assert_eq!(compile("i * l").unwrap().ty, ValueType::Long);
        assert_eq!(compile("l + f").unwrap().ty, ValueType::Float);
        assert_eq!(compile("f / d").unwrap().ty, ValueType::Double);
        assert_eq!(compile("i < d").unwrap().ty, ValueType::Boolean);
        assert_eq!(compile("d > 0 ? i : l").unwrap().ty, ValueType::Long);
        assert_eq!(compile("(short) d").unwrap().ty, ValueType::Short);
        assert_eq!(compile("b << 2").unwrap().ty, ValueType::Int);
        assert_eq!(compile("-b").unwrap().ty, ValueType::Int);
    }

    #[test]
    fn test_bitwise_requires_integers() {
        assert!(compile("i & l").is_ok());
        assert!(compile("(i > 0) | (d < 1)").is_ok());
        match compile("i & f") {
            Err(ExpressionError::Type { message, .. }) => {
                assert!(message.contains("requires integer operands"))
            }
            other => panic!("expected type error, got {other:?}"),
        }
        assert!(compile("~d").is_err());
        assert!(compile("d >> 1").is_err());
    }

    #[test]
    fn test_boolean_rules() {
        assert!(compile("d && i").is_err());
        assert!(compile("!d").is_err());
        assert!(compile("i ? 1 : 2").is_err());
        assert!(compile("(boolean) d").is_err());
        assert!(compile("(i > 0) == true").is_ok());
    }

    #[test]
    fn test_unresolved_variable() {
        match compile("d + missing") {
            Err(ExpressionError::UnresolvedVariable { name, location }) => {
                assert_eq!(name, "missing");
                assert_eq!(location.column(), 5);
            }
            other => panic!("expected unresolved variable, got {other:?}"),
        }
    }

    #[test]
    fn test_constant_folding() {
        let node = compile("-2").unwrap();
        assert!(matches!(node.kind, NodeKind::Const(Value::Int(-2))));
        let node = compile("(float) 3").unwrap();
        assert!(matches!(node.kind, NodeKind::Const(Value::Float(v)) if v == 3.0));
        let node = compile("-PI").unwrap();
        assert!(matches!(node.kind, NodeKind::Const(Value::Double(v)) if v < -3.14));
    }

    #[test]
    fn test_unknown_function_and_arity() {
        assert!(matches!(
            compile("frob(d)"),
            Err(ExpressionError::UnknownFunction { .. })
        ));
        assert!(matches!(
            compile("atan2(d)"),
            Err(ExpressionError::Arity { found: 1, .. })
        ));
    }
}
