//! Compiled expressions and the parser front end.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compile::{Compiler, Node, NodeKind};
use crate::error::{ExpressionError, Result};
use crate::legacy::translate_legacy;
use crate::parser::parse;
use crate::types::{Value, ValueType};

/// Resolves variable names while an expression is compiled.
///
/// Implementations return the index under which the variable's values
/// will later be supplied by a [`VariableSource`], and the variable's type.
/// Resolution may register new inputs lazily; a name must map to the same
/// index for the life of one compilation.
pub trait VariableResolver {
    fn resolve(&mut self, name: &str) -> Option<(usize, ValueType)>;
}

impl<F> VariableResolver for F
where
    F: FnMut(&str) -> Option<(usize, ValueType)>,
{
    fn resolve(&mut self, name: &str) -> Option<(usize, ValueType)> {
        self(name)
    }
}

/// Supplies variable values during evaluation, by resolved index.
pub trait VariableSource {
    fn value(&self, index: usize) -> Value;
}

impl VariableSource for &[Value] {
    fn value(&self, index: usize) -> Value {
        self.get(index).copied().unwrap_or(Value::Double(f64::NAN))
    }
}

impl VariableSource for Vec<Value> {
    fn value(&self, index: usize) -> Value {
        self.as_slice().value(index)
    }
}

impl<const N: usize> VariableSource for [Value; N] {
    fn value(&self, index: usize) -> Value {
        self.as_slice().value(index)
    }
}

/// A fixed name to (index, type) table. Indices follow insertion order.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    entries: HashMap<String, (usize, ValueType)>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable and return its index.
    pub fn insert(&mut self, name: impl Into<String>, value_type: ValueType) -> usize {
        let next = self.entries.len();
        self.entries.entry(name.into()).or_insert((next, value_type)).0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VariableResolver for VariableTable {
    fn resolve(&mut self, name: &str) -> Option<(usize, ValueType)> {
        self.entries.get(name).copied()
    }
}

/// A variable referenced by a compiled expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    /// Index passed to [`VariableSource::value`].
    pub index: usize,
    pub value_type: ValueType,
}

/// Surface syntax accepted by [`ExpressionParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grammar {
    /// C-like syntax with strict typing.
    #[default]
    Modern,
    /// Simplified all-double syntax, translated to modern before compiling.
    Legacy,
}

impl Grammar {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "modern" | "java" => Some(Self::Modern),
            "legacy" | "emulated" => Some(Self::Legacy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Modern => "modern",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compiles expression text in one of the supported grammars.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionParser {
    grammar: Grammar,
}

impl ExpressionParser {
    pub fn new(grammar: Grammar) -> Self {
        Self { grammar }
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    /// Rewrite `text` into the modern grammar. Modern text is returned as is.
    pub fn translate(&self, text: &str) -> Result<String> {
        match self.grammar {
            Grammar::Modern => Ok(text.to_string()),
            Grammar::Legacy => translate_legacy(text),
        }
    }

    /// Compile `text`, resolving variable names through `resolver`.
    ///
    /// Legacy expressions always produce a double.
    pub fn parse(&self, text: &str, resolver: &mut dyn VariableResolver) -> Result<Expression> {
        let source = self.translate(text)?;
        let tree = parse(&source)?;
        let mut compiler = Compiler::new(&source, resolver);
        let root = compiler.compile(&tree)?;
        let variables = compiler.into_variables();
        let expression = Expression {
            source,
            root,
            variables,
        };
        match self.grammar {
            Grammar::Legacy if expression.result_type() != ValueType::Double => {
                expression.adapt(ValueType::Double)
            }
            _ => Ok(expression),
        }
    }
}

/// A type-checked expression ready for evaluation.
///
/// Compiled expressions hold no mutable state and can be evaluated from
/// many threads at once.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Node,
    variables: Vec<Variable>,
}

impl Expression {
    /// Modern-grammar text this expression was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn result_type(&self) -> ValueType {
        self.root.ty
    }

    /// Variables in order of first reference.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn evaluate(&self, source: &dyn VariableSource) -> Result<Value> {
        self.root.eval(source)
    }

    pub fn evaluate_f64(&self, source: &dyn VariableSource) -> Result<f64> {
        Ok(self.root.eval(source)?.as_f64())
    }

    /// Wrap the expression so that it produces `target`.
    ///
    /// A boolean result becomes 1 or 0 before conversion. Numeric results
    /// cannot be adapted to boolean.
    pub fn adapt(self, target: ValueType) -> Result<Expression> {
        let current = self.result_type();
        if current == target {
            return Ok(self);
        }
        if target == ValueType::Boolean {
            return Err(ExpressionError::type_error(
                format!("cannot convert a {current} result to boolean"),
                &self.source,
                0,
            ));
        }
        let root = if current == ValueType::Boolean {
            Node {
                ty: ValueType::Int,
                kind: NodeKind::Conditional(
                    Box::new(self.root),
                    Box::new(int_node(1)),
                    Box::new(int_node(0)),
                ),
            }
        } else {
            self.root
        };
        let source = adapted_source(&self.source, current, target);
        Ok(Expression {
            source,
            root: root.coerce(target),
            variables: self.variables,
        })
    }
}

fn int_node(v: i32) -> Node {
    Node {
        ty: ValueType::Int,
        kind: NodeKind::Const(Value::Int(v)),
    }
}

/// Text equivalent of an adapted expression, kept for diagnostics.
fn adapted_source(source: &str, current: ValueType, target: ValueType) -> String {
    let inner = if current == ValueType::Boolean {
        format!("(({source}) ? 1 : 0)")
    } else {
        format!("({source})")
    };
    format!("({target}) {inner}")
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Split an `<identifier> = <expression>` line into its two halves.
///
/// ```
/// let (name, expr) = grid_expression::split_assignment("sst_c = sst - 273.15").unwrap();
/// assert_eq!(name, "sst_c");
/// assert_eq!(expr, "sst - 273.15");
/// ```
pub fn split_assignment(line: &str) -> Result<(String, String)> {
    let invalid = || ExpressionError::InvalidAssignment(line.to_string());
    let bytes = line.as_bytes();
    let position = (0..bytes.len())
        .find(|&i| {
            bytes[i] == b'='
                && bytes.get(i + 1) != Some(&b'=')
                && !matches!(i.checked_sub(1).map(|p| bytes[p]), Some(b'=' | b'<' | b'>' | b'!'))
        })
        .ok_or_else(invalid)?;

    let name = line[..position].trim();
    let expression = line[position + 1..].trim();
    let mut chars = name.chars();
    let valid_name = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_');
    if !valid_name || expression.is_empty() {
        return Err(invalid());
    }
    Ok((name.to_string(), expression.to_string()))
}
