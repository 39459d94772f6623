//! Tokenizer shared by the modern and legacy grammars.

use crate::error::{ExpressionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NumberKind {
    Int,
    Long,
    Float,
    Double,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NumberLiteral {
    /// Digits with any radix prefix and type suffix removed.
    pub text: String,
    pub radix: u32,
    pub kind: NumberKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Punct {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Bang,
    Tilde,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    UShr,
    Question,
    Colon,
    Comma,
    LParen,
    RParen,
}

impl Punct {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Caret => "^",
            Self::Amp => "&",
            Self::AmpAmp => "&&",
            Self::Pipe => "|",
            Self::PipePipe => "||",
            Self::Bang => "!",
            Self::Tilde => "~",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::UShr => ">>>",
            Self::Question => "?",
            Self::Colon => ":",
            Self::Comma => ",",
            Self::LParen => "(",
            Self::RParen => ")",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(NumberLiteral),
    Ident(String),
    Str(String),
    Punct(Punct),
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
}

impl Token {
    pub fn is_punct(&self, punct: Punct) -> bool {
        self.kind == TokenKind::Punct(punct)
    }

    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Number(n) => format!("number '{}'", n.text),
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::Str(s) => format!("string \"{s}\""),
            TokenKind::Punct(p) => format!("'{}'", p.as_str()),
            TokenKind::End => "end of expression".to_string(),
        }
    }
}

/// Split expression text into tokens, always terminated by `TokenKind::End`.
///
/// With `typed_literals` off, numbers never take a type suffix or a hex
/// prefix, so `2x` lexes as a number followed by a name.
pub(crate) fn tokenize(src: &str, typed_literals: bool) -> Result<Vec<Token>> {
    let mut lexer = Lexer {
        src,
        pos: 0,
        typed_literals,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::End;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    typed_literals: bool,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        let offset = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::End,
                offset,
            });
        };

        let kind = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            TokenKind::Number(self.number(offset)?)
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = self.pos;
            while self
                .peek()
                .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
            {
                self.bump();
            }
            TokenKind::Ident(self.src[start..self.pos].to_string())
        } else if c == '"' {
            self.bump();
            let start = self.pos;
            while self.peek().is_some_and(|c| c != '"') {
                self.bump();
            }
            if !self.eat('"') {
                return Err(ExpressionError::syntax(
                    "unterminated string literal",
                    self.src,
                    offset,
                ));
            }
            TokenKind::Str(self.src[start..self.pos - 1].to_string())
        } else {
            self.bump();
            TokenKind::Punct(self.punct(c, offset)?)
        };

        Ok(Token { kind, offset })
    }

    fn punct(&mut self, c: char, offset: usize) -> Result<Punct> {
        let punct = match c {
            '+' => Punct::Plus,
            '-' => Punct::Minus,
            '*' => Punct::Star,
            '/' => Punct::Slash,
            '%' => Punct::Percent,
            '^' => Punct::Caret,
            '~' => Punct::Tilde,
            '?' => Punct::Question,
            ':' => Punct::Colon,
            ',' => Punct::Comma,
            '(' => Punct::LParen,
            ')' => Punct::RParen,
            '&' => {
                if self.eat('&') {
                    Punct::AmpAmp
                } else {
                    Punct::Amp
                }
            }
            '|' => {
                if self.eat('|') {
                    Punct::PipePipe
                } else {
                    Punct::Pipe
                }
            }
            '!' => {
                if self.eat('=') {
                    Punct::NotEq
                } else {
                    Punct::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    Punct::EqEq
                } else {
                    return Err(ExpressionError::syntax(
                        "unexpected '=' (use '==' for comparison)",
                        self.src,
                        offset,
                    ));
                }
            }
            '<' => {
                if self.eat('=') {
                    Punct::Le
                } else if self.eat('<') {
                    Punct::Shl
                } else {
                    Punct::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Punct::Ge
                } else if self.eat('>') {
                    if self.eat('>') {
                        Punct::UShr
                    } else {
                        Punct::Shr
                    }
                } else {
                    Punct::Gt
                }
            }
            other => {
                return Err(ExpressionError::syntax(
                    format!("unexpected character '{other}'"),
                    self.src,
                    offset,
                ))
            }
        };
        Ok(punct)
    }

    fn digits(&mut self, radix: u32) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_digit(radix) || c == '_') {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn number(&mut self, offset: usize) -> Result<NumberLiteral> {
        if self.typed_literals && self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.pos += 2;
            let text = self.digits(16).replace('_', "");
            if text.is_empty() {
                return Err(ExpressionError::syntax(
                    "hexadecimal literal has no digits",
                    self.src,
                    offset,
                ));
            }
            let kind = if self.eat('L') || self.eat('l') {
                NumberKind::Long
            } else {
                NumberKind::Int
            };
            return Ok(NumberLiteral {
                text,
                radix: 16,
                kind,
            });
        }

        let mut text = self.digits(10).to_string();
        let mut floating = false;
        if self.peek() == Some('.') {
            self.bump();
            text.push('.');
            text.push_str(self.digits(10));
            floating = true;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = self.peek_at(1);
            let has_digits = match sign {
                Some('+' | '-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if has_digits {
                self.bump();
                text.push('e');
                if let Some(s @ ('+' | '-')) = self.peek() {
                    self.bump();
                    text.push(s);
                }
                text.push_str(self.digits(10));
                floating = true;
            }
        }
        let text = text.replace('_', "");

        if !self.typed_literals {
            let kind = if floating {
                NumberKind::Double
            } else {
                NumberKind::Int
            };
            return Ok(NumberLiteral {
                text,
                radix: 10,
                kind,
            });
        }

        let kind = match self.peek() {
            Some('f' | 'F') => {
                self.bump();
                NumberKind::Float
            }
            Some('d' | 'D') => {
                self.bump();
                NumberKind::Double
            }
            Some('l' | 'L') if !floating => {
                self.bump();
                NumberKind::Long
            }
            _ if floating => NumberKind::Double,
            _ => NumberKind::Int,
        };

        Ok(NumberLiteral {
            text,
            radix: 10,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, true)
            .expect("tokenize failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_operators_longest_match() {
        let k = kinds("a >>> 2 >= b != !c");
        assert_eq!(k[1], TokenKind::Punct(Punct::UShr));
        assert_eq!(k[3], TokenKind::Punct(Punct::Ge));
        assert_eq!(k[5], TokenKind::Punct(Punct::NotEq));
        assert_eq!(k[6], TokenKind::Punct(Punct::Bang));
        assert_eq!(k.last(), Some(&TokenKind::End));
    }

    #[test]
    fn test_number_suffixes() {
        let k = kinds("1 2L 3.5 4f .5 1e3 0xff");
        let expect = [
            NumberKind::Int,
            NumberKind::Long,
            NumberKind::Double,
            NumberKind::Float,
            NumberKind::Double,
            NumberKind::Double,
            NumberKind::Int,
        ];
        for (token, kind) in k.iter().zip(expect) {
            match token {
                TokenKind::Number(n) => assert_eq!(n.kind, kind),
                other => panic!("expected number, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_offsets_and_strings() {
        let tokens = tokenize("hex(\"0xff\")", false).expect("tokenize failed");
        assert_eq!(tokens[2].kind, TokenKind::Str("0xff".to_string()));
        assert_eq!(tokens[2].offset, 4);
    }

    #[test]
    fn test_single_equals_rejected() {
        let err = tokenize("a = b", true).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { .. }));
    }

    #[test]
    fn test_exponent_requires_digits() {
        // "2e" followed by a name is a number then an identifier
        let k = kinds("2ex");
        assert!(matches!(k[0], TokenKind::Number(_)));
        assert_eq!(k[1], TokenKind::Ident("ex".to_string()));
    }

    #[test]
    fn test_untyped_literals_leave_suffix_letters() {
        let tokens = tokenize("2d", false).expect("tokenize failed");
        assert!(matches!(&tokens[0].kind, TokenKind::Number(n) if n.kind == NumberKind::Int));
        assert_eq!(tokens[1].kind, TokenKind::Ident("d".to_string()));
    }
}
