//! Per-pixel math expressions for gridded data.
//!
//! Expressions are compiled once and then evaluated for every grid cell.
//! Two surface grammars are accepted:
//!
//! - **Modern**: C-like syntax with strict typing (`byte` through `double`
//!   plus `boolean`), integer wrap-around, bitwise operators, casts and a
//!   library of math functions.
//! - **Legacy**: a simplified all-double language (`^` for powers, implicit
//!   multiplication, `mod()`, `select()`, `mask()`) that is translated into
//!   modern text before compiling.
//!
//! ```text
//! text ──► [legacy::translate] ──► lexer ──► parser ──► ast::Expr
//!                                                         │
//!              VariableResolver ◄── compile::Compiler ◄───┘
//!                                         │
//!                                         ▼
//!                                    Expression ──► evaluate(VariableSource)
//! ```
//!
//! Variable names are resolved through a [`VariableResolver`] while
//! compiling, which lets callers bind inputs lazily. At evaluation time a
//! [`VariableSource`] supplies one value per resolved index.
//!
//! # Example
//!
//! ```
//! use grid_expression::{ExpressionParser, Grammar, Value, ValueType, VariableTable};
//!
//! let mut vars = VariableTable::new();
//! vars.insert("sst", ValueType::Float);
//!
//! let expr = ExpressionParser::new(Grammar::Modern)
//!     .parse("sst > 300 ? 1 : 0", &mut vars)
//!     .unwrap();
//! assert_eq!(expr.result_type(), ValueType::Int);
//! assert_eq!(expr.evaluate(&[Value::Float(301.5)]).unwrap(), Value::Int(1));
//! ```

mod ast;
mod compile;
pub mod error;
mod eval;
mod expression;
mod functions;
mod legacy;
mod lexer;
mod parser;
pub mod types;

pub use error::{ExpressionError, Location, Result};
pub use expression::{
    split_assignment, Expression, ExpressionParser, Grammar, Variable, VariableResolver,
    VariableSource, VariableTable,
};
pub use functions::{great_circle_distance, EARTH_RADIUS_KM};
pub use legacy::translate_legacy;
pub use types::{Value, ValueType};
