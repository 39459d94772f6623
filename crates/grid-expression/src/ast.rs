//! Untyped syntax tree for the modern grammar.
//!
//! The legacy translator builds these trees directly and prints them back
//! out as modern-grammar text, so `Display` always emits fully
//! parenthesized source that re-parses to the same tree.

use std::fmt;

use crate::types::ValueType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "!",
            Self::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::UShr => ">>>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::BitAnd => "&",
            Self::BitXor => "^",
            Self::BitOr => "|",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    Unary(UnaryOp, Box<Expr>),
    Cast(ValueType, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// A syntax node and the source offset used in error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub offset: usize,
}

impl Expr {
    pub fn new(kind: ExprKind, offset: usize) -> Self {
        Self { kind, offset }
    }

    pub fn literal(literal: Literal) -> Self {
        Self::new(ExprKind::Literal(literal), 0)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Ident(name.into()), 0)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::new(ExprKind::Unary(op, Box::new(operand)), 0)
    }

    pub fn cast(ty: ValueType, operand: Expr) -> Self {
        Self::new(ExprKind::Cast(ty, Box::new(operand)), 0)
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), 0)
    }

    pub fn conditional(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Self::new(
            ExprKind::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise)),
            0,
        )
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call(name.into(), args), 0)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v:?}f"),
            Self::Double(v) if v.is_nan() => write!(f, "NaN"),
            Self::Double(v) if v.is_infinite() => {
                write!(f, "{}", if v > 0.0 { "(1.0 / 0.0)" } else { "(-1.0 / 0.0)" })
            }
            Self::Double(v) => write!(f, "{v:?}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(literal) => write!(f, "{literal}"),
            ExprKind::Ident(name) => write!(f, "{name}"),
            ExprKind::Unary(op, operand) => write!(f, "({}{})", op.symbol(), operand),
            ExprKind::Cast(ty, operand) => write!(f, "(({}) {})", ty, operand),
            ExprKind::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            ExprKind::Conditional(cond, then, otherwise) => {
                write!(f, "({cond} ? {then} : {otherwise})")
            }
            ExprKind::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_parenthesizes() {
        let expr = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Add, Expr::ident("a"), Expr::literal(Literal::Int(1))),
            Expr::cast(ValueType::Double, Expr::ident("b")),
        );
        assert_eq!(expr.to_string(), "((a + 1) * ((double) b))");
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::Double(2.0).to_string(), "2.0");
        assert_eq!(Literal::Long(7).to_string(), "7L");
        assert_eq!(Literal::Float(0.5).to_string(), "0.5f");
        assert_eq!(Literal::Double(1e300).to_string(), "1e300");
    }
}
