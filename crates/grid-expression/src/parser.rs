//! Recursive descent parser for the modern grammar.
//!
//! Precedence, loosest first: `?:`, `||`, `&&`, `|`, `^`, `&`,
//! `== !=`, `< <= > >=`, `<< >> >>>`, `+ -`, `* / %`, then the prefix
//! operators `- + ! ~` and casts such as `(int) x`.

use crate::ast::{BinaryOp, Expr, ExprKind, Literal, UnaryOp};
use crate::error::{ExpressionError, Result};
use crate::lexer::{tokenize, NumberKind, NumberLiteral, Punct, Token, TokenKind};
use crate::types::ValueType;

/// Parse modern-grammar text into a syntax tree.
pub fn parse(src: &str) -> Result<Expr> {
    let tokens = tokenize(src, true)?;
    let mut parser = Parser {
        src,
        tokens,
        pos: 0,
    };
    let expr = parser.conditional()?;
    let next = parser.peek();
    if next.kind != TokenKind::End {
        return Err(ExpressionError::syntax(
            format!("unexpected {}", next.describe()),
            src,
            next.offset,
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

/// Binary operator levels from loosest to tightest.
const LEVELS: &[&[(Punct, BinaryOp)]] = &[
    &[(Punct::PipePipe, BinaryOp::Or)],
    &[(Punct::AmpAmp, BinaryOp::And)],
    &[(Punct::Pipe, BinaryOp::BitOr)],
    &[(Punct::Caret, BinaryOp::BitXor)],
    &[(Punct::Amp, BinaryOp::BitAnd)],
    &[(Punct::EqEq, BinaryOp::Eq), (Punct::NotEq, BinaryOp::Ne)],
    &[
        (Punct::Lt, BinaryOp::Lt),
        (Punct::Le, BinaryOp::Le),
        (Punct::Gt, BinaryOp::Gt),
        (Punct::Ge, BinaryOp::Ge),
    ],
    &[
        (Punct::Shl, BinaryOp::Shl),
        (Punct::Shr, BinaryOp::Shr),
        (Punct::UShr, BinaryOp::UShr),
    ],
    &[(Punct::Plus, BinaryOp::Add), (Punct::Minus, BinaryOp::Sub)],
    &[
        (Punct::Star, BinaryOp::Mul),
        (Punct::Slash, BinaryOp::Div),
        (Punct::Percent, BinaryOp::Rem),
    ],
];

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        // tokenize always terminates the list with End
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::End {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, punct: Punct) -> Result<Token> {
        let token = self.peek();
        if token.is_punct(punct) {
            Ok(self.advance())
        } else {
            Err(ExpressionError::syntax(
                format!("expected '{}' but found {}", punct.as_str(), token.describe()),
                self.src,
                token.offset,
            ))
        }
    }

    fn conditional(&mut self) -> Result<Expr> {
        let cond = self.binary(0)?;
        if !self.peek().is_punct(Punct::Question) {
            return Ok(cond);
        }
        let offset = self.advance().offset;
        let then = self.conditional()?;
        self.expect(Punct::Colon)?;
        let otherwise = self.conditional()?;
        Ok(Expr::new(
            ExprKind::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise)),
            offset,
        ))
    }

    fn binary(&mut self, level: usize) -> Result<Expr> {
        let Some(ops) = LEVELS.get(level) else {
            return self.unary();
        };
        let mut lhs = self.binary(level + 1)?;
        loop {
            let token = self.peek();
            let Some(&(_, op)) = ops.iter().find(|(p, _)| token.is_punct(*p)) else {
                return Ok(lhs);
            };
            let offset = self.advance().offset;
            let rhs = self.binary(level + 1)?;
            lhs = Expr::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), offset);
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Punct(Punct::Minus) => {
                self.advance();
                // fold the sign into integer literals so MIN values parse
                if let TokenKind::Number(n) = &self.peek().kind {
                    if matches!(n.kind, NumberKind::Int | NumberKind::Long) {
                        let n = n.clone();
                        let offset = self.advance().offset;
                        let literal = number_literal(&n, true, self.src, offset)?;
                        return Ok(Expr::new(ExprKind::Literal(literal), token.offset));
                    }
                }
                let operand = self.unary()?;
                Ok(Expr::new(ExprKind::Unary(UnaryOp::Neg, Box::new(operand)), token.offset))
            }
            TokenKind::Punct(Punct::Plus) => {
                self.advance();
                self.unary()
            }
            TokenKind::Punct(Punct::Bang) => {
                self.advance();
                let operand = self.unary()?;
                Ok(Expr::new(ExprKind::Unary(UnaryOp::Not, Box::new(operand)), token.offset))
            }
            TokenKind::Punct(Punct::Tilde) => {
                self.advance();
                let operand = self.unary()?;
                Ok(Expr::new(ExprKind::Unary(UnaryOp::BitNot, Box::new(operand)), token.offset))
            }
            TokenKind::Punct(Punct::LParen) => {
                if let Some(ty) = self.cast_type() {
                    self.pos += 3;
                    let operand = self.unary()?;
                    return Ok(Expr::new(ExprKind::Cast(ty, Box::new(operand)), token.offset));
                }
                self.primary()
            }
            _ => self.primary(),
        }
    }

    /// Looks for `( type )` at the current position.
    fn cast_type(&self) -> Option<ValueType> {
        let TokenKind::Ident(name) = &self.peek_at(1).kind else {
            return None;
        };
        if !self.peek_at(2).is_punct(Punct::RParen) {
            return None;
        }
        ValueType::from_str(name)
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => {
                let literal = number_literal(&n, false, self.src, token.offset)?;
                Ok(Expr::new(ExprKind::Literal(literal), token.offset))
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::new(ExprKind::Literal(Literal::Boolean(true)), token.offset)),
                "false" => Ok(Expr::new(ExprKind::Literal(Literal::Boolean(false)), token.offset)),
                _ if self.peek().is_punct(Punct::LParen) => {
                    self.advance();
                    let args = self.arguments()?;
                    Ok(Expr::new(ExprKind::Call(name, args), token.offset))
                }
                _ => Ok(Expr::new(ExprKind::Ident(name), token.offset)),
            },
            TokenKind::Punct(Punct::LParen) => {
                let inner = self.conditional()?;
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

    /// Parses a call argument list after the opening parenthesis.
    fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek().is_punct(Punct::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.conditional()?);
            if self.peek().is_punct(Punct::Comma) {
                self.advance();
                continue;
            }
            self.expect(Punct::RParen)?;
            return Ok(args);
        }
    }
}

/// Convert a lexed number into a typed literal, range checking integers.
fn number_literal(n: &NumberLiteral, negative: bool, src: &str, offset: usize) -> Result<Literal> {
    let out_of_range = || ExpressionError::syntax(format!("number '{}' is out of range", n.text), src, offset);
    match n.kind {
        NumberKind::Int | NumberKind::Long => {
            let magnitude = u64::from_str_radix(&n.text, n.radix).map_err(|_| out_of_range())?;
            let value = if negative {
                if magnitude > i64::MAX as u64 + 1 {
                    return Err(out_of_range());
                }
                (magnitude as i64).wrapping_neg()
            } else if n.radix == 16 {
                // hex literals may use the full bit width
                match n.kind {
                    NumberKind::Int if magnitude <= u32::MAX as u64 => magnitude as u32 as i32 as i64,
                    NumberKind::Long => magnitude as i64,
                    _ => return Err(out_of_range()),
                }
            } else {
                i64::try_from(magnitude).map_err(|_| out_of_range())?
            };
            if n.kind == NumberKind::Long {
                Ok(Literal::Long(value))
            } else {
                i32::try_from(value).map(Literal::Int).map_err(|_| out_of_range())
            }
        }
        NumberKind::Float => n
            .text
            .parse::<f32>()
            .map(Literal::Float)
            .map_err(|_| ExpressionError::syntax(format!("invalid number '{}'", n.text), src, offset)),
        NumberKind::Double => n
            .text
            .parse::<f64>()
            .map(Literal::Double)
            .map_err(|_| ExpressionError::syntax(format!("invalid number '{}'", n.text), src, offset)),
    }
}
