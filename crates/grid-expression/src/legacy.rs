//! Legacy grammar support.
//!
//! The legacy grammar treats every value as a double: comparisons and
//! logical operators yield 1 or 0, `^` is exponentiation, and bitwise
//! work is done through the named functions `and`, `or`, `xor` and
//! `not`. Legacy text is never evaluated directly. It is parsed here,
//! rewritten into an equivalent modern syntax tree and printed back out
//! as modern-grammar text for the regular compiler.

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::error::{ExpressionError, Location, Result};
use crate::lexer::{tokenize, Punct, Token, TokenKind};
use crate::types::ValueType;

/// Translate legacy-grammar text into modern-grammar text.
///
/// ```
/// let modern = grid_expression::translate_legacy("a^2 + mod(b, 3)").unwrap();
/// assert_eq!(modern, "(pow(((double) a), 2.0) + (((double) b) % 3.0))");
/// ```
pub fn translate_legacy(src: &str) -> Result<String> {
    let tokens = tokenize(src, false)?;
    let mut parser = LegacyParser {
        src,
        tokens,
        pos: 0,
    };
    let tree = parser.or()?;
    let next = parser.peek();
    if next.kind != TokenKind::End {
        return Err(ExpressionError::syntax(
            format!("unexpected {}", next.describe()),
            src,
            next.offset,
        ));
    }
    let translator = Translator { src };
    let translated = translator.numeric(&tree)?;
    let text = translated.to_string();
    tracing::debug!(legacy = src, modern = %text, "Translated legacy expression");
    Ok(text)
}

#[derive(Debug, Clone, PartialEq)]
enum Legacy {
    Number(f64),
    Str(String, usize),
    Name(String),
    Unary(Punct, Box<Legacy>),
    Binary(Punct, Box<Legacy>, Box<Legacy>),
    Call(String, Vec<Legacy>, usize),
}

struct LegacyParser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> LegacyParser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::End {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, punct: Punct) -> Result<()> {
        let token = self.peek();
        if token.is_punct(punct) {
            self.advance();
            Ok(())
        } else {
            Err(ExpressionError::syntax(
                format!("expected '{}' but found {}", punct.as_str(), token.describe()),
                self.src,
                token.offset,
            ))
        }
    }

    /// Parse a left-associative level made of the given operators.
    fn level(
        &mut self,
        ops: &[Punct],
        next: fn(&mut Self) -> Result<Legacy>,
    ) -> Result<Legacy> {
        let mut lhs = next(self)?;
        loop {
            let Some(&op) = ops.iter().find(|p| self.peek().is_punct(**p)) else {
                return Ok(lhs);
            };
            self.advance();
            let rhs = next(self)?;
            lhs = Legacy::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn or(&mut self) -> Result<Legacy> {
        self.level(&[Punct::PipePipe], Self::and)
    }

    fn and(&mut self) -> Result<Legacy> {
        self.level(&[Punct::AmpAmp], Self::equality)
    }

    fn equality(&mut self) -> Result<Legacy> {
        self.level(&[Punct::EqEq, Punct::NotEq], Self::relational)
    }

    fn relational(&mut self) -> Result<Legacy> {
        self.level(
            &[Punct::Lt, Punct::Le, Punct::Gt, Punct::Ge],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Legacy> {
        self.level(&[Punct::Plus, Punct::Minus], Self::multiplicative)
    }

    /// Multiplication, division, remainder and implicit multiplication
    /// such as `2x` or `(a)(b)`.
    fn multiplicative(&mut self) -> Result<Legacy> {
        let mut lhs = self.unary()?;
        loop {
            let token = self.peek();
            let op = if token.is_punct(Punct::Star) {
                Punct::Star
            } else if token.is_punct(Punct::Slash) {
                Punct::Slash
            } else if token.is_punct(Punct::Percent) {
                Punct::Percent
            } else if matches!(
                token.kind,
                TokenKind::Number(_) | TokenKind::Ident(_) | TokenKind::Punct(Punct::LParen)
            ) {
                let rhs = self.unary()?;
                lhs = Legacy::Binary(Punct::Star, Box::new(lhs), Box::new(rhs));
                continue;
            } else {
                return Ok(lhs);
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Legacy::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Legacy> {
        let token = self.peek();
        for op in [Punct::Minus, Punct::Plus, Punct::Bang] {
            if token.is_punct(op) {
                self.advance();
                let operand = self.unary()?;
                return Ok(Legacy::Unary(op, Box::new(operand)));
            }
        }
        self.power()
    }

    /// `^` binds tighter than unary minus and is right associative.
    fn power(&mut self) -> Result<Legacy> {
        let base = self.primary()?;
        if self.peek().is_punct(Punct::Caret) {
            self.advance();
            let exponent = self.unary()?;
            return Ok(Legacy::Binary(Punct::Caret, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Legacy> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => n.text.parse::<f64>().map(Legacy::Number).map_err(|_| {
                ExpressionError::syntax(format!("invalid number '{}'", n.text), self.src, token.offset)
            }),
            TokenKind::Str(s) => Ok(Legacy::Str(s, token.offset)),
            TokenKind::Ident(name) => {
                if !self.peek().is_punct(Punct::LParen) {
                    return Ok(Legacy::Name(name));
                }
                self.advance();
                let mut args = Vec::new();
                if self.peek().is_punct(Punct::RParen) {
                    self.advance();
                    return Ok(Legacy::Call(name, args, token.offset));
                }
                loop {
                    args.push(self.or()?);
                    if self.peek().is_punct(Punct::Comma) {
                        self.advance();
                        continue;
                    }
                    self.expect(Punct::RParen)?;
                    return Ok(Legacy::Call(name, args, token.offset));
                }
            }
            TokenKind::Punct(Punct::LParen) => {
                let inner = self.or()?;
                self.expect(Punct::RParen)?;
                Ok(inner)
            }
            _ => Err(ExpressionError::syntax(
                format!("unexpected {}", token.describe()),
                self.src,
                token.offset,
            )),
        }
    }
}

/// Whether a translated subtree yields a number or a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Number,
    Boolean,
}

fn double(v: f64) -> Expr {
    Expr::literal(Literal::Double(v))
}

fn to_long(expr: Expr) -> Expr {
    Expr::cast(ValueType::Long, expr)
}

/// Functions whose name and arguments carry over unchanged, plus the
/// renamed ones.
fn modern_name(name: &str) -> Option<&'static str> {
    Some(match name {
        "sin" => "sin",
        "cos" => "cos",
        "tan" => "tan",
        "asin" => "asin",
        "acos" => "acos",
        "atan" => "atan",
        "atan2" => "atan2",
        "sinh" => "sinh",
        "cosh" => "cosh",
        "tanh" => "tanh",
        "asinh" => "asinh",
        "acosh" => "acosh",
        "atanh" => "atanh",
        "sqrt" => "sqrt",
        "abs" => "abs",
        "exp" => "exp",
        "floor" => "floor",
        "ceil" => "ceil",
        "round" => "round",
        "sum" => "sum",
        "pow" => "pow",
        "log" => "log10",
        "ln" => "log",
        "angle" => "atan2",
        "rand" => "random",
        _ => return None,
    })
}

struct Translator<'a> {
    src: &'a str,
}

impl<'a> Translator<'a> {
    fn numeric(&self, node: &Legacy) -> Result<Expr> {
        let (expr, kind) = self.translate(node)?;
        Ok(match kind {
            Kind::Number => expr,
            Kind::Boolean => Expr::conditional(expr, double(1.0), double(0.0)),
        })
    }

    fn boolean(&self, node: &Legacy) -> Result<Expr> {
        let (expr, kind) = self.translate(node)?;
        Ok(match kind {
            Kind::Boolean => expr,
            Kind::Number => Expr::binary(BinaryOp::Ne, expr, double(0.0)),
        })
    }

    fn arity(&self, name: &str, args: &[Legacy], expected: usize, offset: usize) -> Result<()> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(ExpressionError::Arity {
                name: name.to_string(),
                expected: expected.to_string(),
                found: args.len(),
                location: Location::new(self.src, offset),
            })
        }
    }

    fn translate(&self, node: &Legacy) -> Result<(Expr, Kind)> {
        match node {
            Legacy::Number(v) => Ok((double(*v), Kind::Number)),
            Legacy::Str(_, offset) => Err(ExpressionError::type_error(
                "string literals are only allowed as the argument of hex()",
                self.src,
                *offset,
            )),
            Legacy::Name(name) => Ok((
                match name.as_str() {
                    "e" => Expr::ident("E"),
                    "pi" => Expr::ident("PI"),
                    "nan" => Expr::ident("NaN"),
                    other => Expr::cast(ValueType::Double, Expr::ident(other)),
                },
                Kind::Number,
            )),
            Legacy::Unary(op, operand) => match op {
                Punct::Minus => Ok((Expr::unary(UnaryOp::Neg, self.numeric(operand)?), Kind::Number)),
                Punct::Bang => {
                    let (expr, kind) = self.translate(operand)?;
                    let negated = match kind {
                        Kind::Boolean => Expr::unary(UnaryOp::Not, expr),
                        Kind::Number => Expr::binary(BinaryOp::Eq, expr, double(0.0)),
                    };
                    Ok((negated, Kind::Boolean))
                }
                _ => Ok((self.numeric(operand)?, Kind::Number)),
            },
            Legacy::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs),
            Legacy::Call(name, args, offset) => self.call(name, args, *offset),
        }
    }

    fn binary(&self, op: Punct, lhs: &Legacy, rhs: &Legacy) -> Result<(Expr, Kind)> {
        let arith = |op| -> Result<(Expr, Kind)> {
            Ok((
                Expr::binary(op, self.numeric(lhs)?, self.numeric(rhs)?),
                Kind::Number,
            ))
        };
        let compare = |op| -> Result<(Expr, Kind)> {
            Ok((
                Expr::binary(op, self.numeric(lhs)?, self.numeric(rhs)?),
                Kind::Boolean,
            ))
        };
        let logical = |op| -> Result<(Expr, Kind)> {
            Ok((
                Expr::binary(op, self.boolean(lhs)?, self.boolean(rhs)?),
                Kind::Boolean,
            ))
        };
        match op {
            Punct::Plus => arith(BinaryOp::Add),
            Punct::Minus => arith(BinaryOp::Sub),
            Punct::Star => arith(BinaryOp::Mul),
            Punct::Slash => arith(BinaryOp::Div),
            Punct::Percent => arith(BinaryOp::Rem),
            Punct::Caret => Ok((
                Expr::call("pow", vec![self.numeric(lhs)?, self.numeric(rhs)?]),
                Kind::Number,
            )),
            Punct::Lt => compare(BinaryOp::Lt),
            Punct::Le => compare(BinaryOp::Le),
            Punct::Gt => compare(BinaryOp::Gt),
            Punct::Ge => compare(BinaryOp::Ge),
            Punct::EqEq => compare(BinaryOp::Eq),
            Punct::NotEq => compare(BinaryOp::Ne),
            Punct::AmpAmp => logical(BinaryOp::And),
            Punct::PipePipe => logical(BinaryOp::Or),
            other => Err(ExpressionError::syntax(
                format!("operator '{}' is not part of the legacy grammar", other.as_str()),
                self.src,
                0,
            )),
        }
    }

    fn call(&self, name: &str, args: &[Legacy], offset: usize) -> Result<(Expr, Kind)> {
        let number = |expr: Expr| -> Result<(Expr, Kind)> { Ok((expr, Kind::Number)) };
        match name {
            "mod" => {
                self.arity(name, args, 2, offset)?;
                number(Expr::binary(
                    BinaryOp::Rem,
                    self.numeric(&args[0])?,
                    self.numeric(&args[1])?,
                ))
            }
            "select" | "if" => {
                self.arity(name, args, 3, offset)?;
                number(Expr::conditional(
                    self.boolean(&args[0])?,
                    self.numeric(&args[1])?,
                    self.numeric(&args[2])?,
                ))
            }
            "hex" => {
                self.arity(name, args, 1, offset)?;
                let Legacy::Str(text, at) = &args[0] else {
                    return Err(ExpressionError::type_error(
                        "hex() expects a string such as \"0xff\"",
                        self.src,
                        offset,
                    ));
                };
                let digits = text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                    .unwrap_or(text);
                let value = u64::from_str_radix(digits, 16).map_err(|_| {
                    ExpressionError::type_error(
                        format!("invalid hexadecimal value \"{text}\""),
                        self.src,
                        *at,
                    )
                })?;
                number(double(value as f64))
            }
            "mask" => {
                self.arity(name, args, 3, offset)?;
                let bits = Expr::binary(
                    BinaryOp::BitAnd,
                    to_long(self.numeric(&args[1])?),
                    to_long(self.numeric(&args[2])?),
                );
                number(Expr::conditional(
                    Expr::binary(BinaryOp::Eq, bits, Expr::literal(Literal::Long(0))),
                    self.numeric(&args[0])?,
                    Expr::ident("NaN"),
                ))
            }
            "and" | "or" | "xor" => {
                self.arity(name, args, 2, offset)?;
                let op = match name {
                    "and" => BinaryOp::BitAnd,
                    "or" => BinaryOp::BitOr,
                    _ => BinaryOp::BitXor,
                };
                number(Expr::binary(
                    op,
                    to_long(self.numeric(&args[0])?),
                    to_long(self.numeric(&args[1])?),
                ))
            }
            "not" => {
                self.arity(name, args, 1, offset)?;
                number(Expr::unary(UnaryOp::BitNot, to_long(self.numeric(&args[0])?)))
            }
            _ => {
                let Some(modern) = modern_name(name) else {
                    return Err(ExpressionError::UnknownFunction {
                        name: name.to_string(),
                        location: Location::new(self.src, offset),
                    });
                };
                let args = args
                    .iter()
                    .map(|arg| self.numeric(arg))
                    .collect::<Result<Vec<_>>>()?;
                number(Expr::call(modern, args))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tr(src: &str) -> String {
        translate_legacy(src).expect("translation failed")
    }

    #[test]
    fn test_variables_widen_to_double() {
        assert_eq!(tr("a + 1"), "(((double) a) + 1.0)");
    }

    #[test]
    fn test_power_and_unary_precedence() {
        assert_eq!(tr("-2^2"), "(-pow(2.0, 2.0))");
        assert_eq!(tr("2^-1"), "pow(2.0, (-1.0))");
        assert_eq!(tr("2^3^2"), "pow(2.0, pow(3.0, 2.0))");
        assert_eq!(tr("+x"), "((double) x)");
    }

    #[test]
    fn test_boolean_results_become_numbers() {
        assert_eq!(tr("a > 1"), "((((double) a) > 1.0) ? 1.0 : 0.0)");
        assert_eq!(
            tr("(a > 1) + 1"),
            "(((((double) a) > 1.0) ? 1.0 : 0.0) + 1.0)"
        );
    }

    #[test]
    fn test_numbers_become_booleans() {
        assert_eq!(
            tr("a && b"),
            "(((((double) a) != 0.0) && (((double) b) != 0.0)) ? 1.0 : 0.0)"
        );
        assert_eq!(tr("!a"), "((((double) a) == 0.0) ? 1.0 : 0.0)");
        assert_eq!(tr("!(a > 0)"), "((!(((double) a) > 0.0)) ? 1.0 : 0.0)");
    }

    #[test]
    fn test_named_functions() {
        assert_eq!(tr("mod(a, 2)"), "(((double) a) % 2.0)");
        assert_eq!(tr("log(x)"), "log10(((double) x))");
        assert_eq!(tr("ln(x)"), "log(((double) x))");
        assert_eq!(tr("angle(y, x)"), "atan2(((double) y), ((double) x))");
        assert_eq!(tr("rand()"), "random()");
        assert_eq!(tr("pi * e"), "(PI * E)");
        assert_eq!(
            tr("select(a, 1, nan)"),
            "((((double) a) != 0.0) ? 1.0 : NaN)"
        );
    }

    #[test]
    fn test_bitwise_functions() {
        assert_eq!(tr("hex(\"0xff\")"), "255.0");
        assert_eq!(
            tr("and(a, 6)"),
            "(((long) ((double) a)) & ((long) 6.0))"
        );
        assert_eq!(tr("not(a)"), "(~((long) ((double) a)))");
        assert_eq!(
            tr("mask(sst, flags, hex(\"0x3\"))"),
            "(((((long) ((double) flags)) & ((long) 3.0)) == 0L) ? ((double) sst) : NaN)"
        );
    }

    #[test]
    fn test_implicit_multiplication() {
        assert_eq!(tr("2x"), "(2.0 * ((double) x))");
        assert_eq!(tr("(a)(b)"), "(((double) a) * ((double) b))");
        assert_eq!(tr("2 sin(x)"), "(2.0 * sin(((double) x)))");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            translate_legacy("frob(1)"),
            Err(ExpressionError::UnknownFunction { .. })
        ));
        assert!(matches!(
            translate_legacy("mod(1)"),
            Err(ExpressionError::Arity { .. })
        ));
        assert!(matches!(
            translate_legacy("a & b"),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(matches!(
            translate_legacy("\"0x1\" + 1"),
            Err(ExpressionError::Type { .. })
        ));
        assert!(translate_legacy("hex(\"zz\")").is_err());
    }
}
