use std::sync::Arc;

use grid_expression::{
    split_assignment, Expression, ExpressionError, ExpressionParser, Value, ValueType,
};
use tracing::{debug, warn};

use super::ChunkFunction;
use crate::chunk::{allocate, DataChunk};
use crate::collector::{ChunkCollector, CollectorBinder};
use crate::error::{ChunkError, Result};
use crate::position::ChunkPosition;
use crate::producer::ChunkProducer;

/// A compiled expression evaluated per pixel.
///
/// Inputs are addressed by the collector index each variable was bound to.
/// Integer division by zero makes that pixel missing; any other evaluation
/// failure fails the position. Floating division by zero yields an
/// infinity, which float output stores as is and integer or packed output
/// stores as missing.
#[derive(Debug, Clone)]
pub struct ExpressionFunction {
    name: String,
    expression: Expression,
    prototype: DataChunk,
    skip_missing: bool,
    referenced: Vec<usize>,
}

impl ExpressionFunction {
    /// Wrap `expression`, converting its result to the external type of
    /// `prototype` when they differ.
    ///
    /// Boolean results become 1 or 0. Numeric results are converted when
    /// the output chunk is encoded, so values outside the output range are
    /// stored as missing rather than wrapped.
    pub fn new(
        name: impl Into<String>,
        expression: Expression,
        prototype: DataChunk,
        skip_missing: bool,
    ) -> Result<Self> {
        let name = name.into();
        let target = prototype.external_type().value_type();
        let expression = if expression.result_type() == ValueType::Boolean {
            expression.adapt(ValueType::Int)?
        } else {
            expression
        };
        if expression.result_type() != target {
            warn!(
                output = %name,
                from = %expression.result_type(),
                to = %target,
                "Converting expression result to output type"
            );
        }
        let referenced = expression.variables().iter().map(|v| v.index).collect();
        Ok(Self {
            name,
            expression,
            prototype: DataChunk::prototype(*prototype.format()),
            skip_missing,
            referenced,
        })
    }

    /// Compile `line` (`<name> = <expression>`), registering producers for
    /// unseen variables through `lookup`.
    pub fn compile(
        parser: &ExpressionParser,
        line: &str,
        collector: &mut ChunkCollector,
        lookup: impl FnMut(&str) -> Result<Option<Arc<dyn ChunkProducer>>>,
        prototype: DataChunk,
        skip_missing: bool,
    ) -> Result<Self> {
        let (name, text) = split_assignment(line)?;
        let mut binder = CollectorBinder::new(collector, lookup);
        let parsed = parser.parse(&text, &mut binder);
        binder.finish()?;
        let expression = parsed?;
        debug!(
            output = %name,
            expression = %expression,
            result = %expression.result_type(),
            "Compiled expression"
        );
        Self::new(name, expression, prototype, skip_missing)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn prototype(&self) -> &DataChunk {
        &self.prototype
    }
}

impl ChunkFunction for ExpressionFunction {
    fn apply(&self, position: &ChunkPosition, inputs: &[DataChunk]) -> Result<DataChunk> {
        let count = position.values();
        if let Some(&index) = self.referenced.iter().find(|&&i| i >= inputs.len()) {
            return Err(ChunkError::function(format!(
                "'{}' reads input {index} but only {} were fetched",
                self.name,
                inputs.len()
            )));
        }
        let decoded: Vec<(Vec<Value>, Vec<bool>)> = inputs
            .iter()
            .map(|chunk| chunk.accessor().values())
            .collect();

        let mut values = allocate::<Value>(count)?;
        let mut missing = allocate::<bool>(count)?;
        let mut row = vec![Value::Double(f64::NAN); inputs.len()];

        for pixel in 0..count {
            let skip = self.skip_missing
                && self
                    .referenced
                    .iter()
                    .any(|&i| decoded[i].1.get(pixel).copied().unwrap_or(true));
            if skip {
                values.push(Value::Double(f64::NAN));
                missing.push(true);
                continue;
            }
            for &i in &self.referenced {
                row[i] = decoded[i]
                    .0
                    .get(pixel)
                    .copied()
                    .unwrap_or(Value::Double(f64::NAN));
            }
            match self.expression.evaluate(&row) {
                Ok(value) => {
                    values.push(value);
                    missing.push(false);
                }
                Err(ExpressionError::DivisionByZero) => {
                    values.push(Value::Double(f64::NAN));
                    missing.push(true);
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.prototype.with_values_flagged(&values, &missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkFormat, DataType, PackingScheme};
    use crate::grid::{GridInfo, MemoryGrid, SharedGrid};
    use crate::producer::GridChunkProducer;
    use grid_expression::Grammar;

    fn input(name: &str, format: ChunkFormat, values: &[f64]) -> Arc<dyn ChunkProducer> {
        let info = GridInfo::new(name, [1, values.len()], [1, values.len()], format);
        Arc::new(GridChunkProducer::new(SharedGrid::new(
            MemoryGrid::from_doubles(info, values).unwrap(),
        )))
    }

    fn compile(
        line: &str,
        inputs: Vec<Arc<dyn ChunkProducer>>,
        output: ChunkFormat,
        skip_missing: bool,
    ) -> Result<(ExpressionFunction, ChunkCollector)> {
        let mut collector = ChunkCollector::new();
        let function = ExpressionFunction::compile(
            &ExpressionParser::new(Grammar::Modern),
            line,
            &mut collector,
            |name| Ok(inputs.iter().find(|p| p.name() == name).cloned()),
            DataChunk::prototype(output),
            skip_missing,
        )?;
        Ok((function, collector))
    }

    fn run(function: &ExpressionFunction, collector: &ChunkCollector, width: usize) -> Vec<f64> {
        let position = ChunkPosition::new([0, 0], [1, width]);
        let chunks = collector.get_chunks(&position).unwrap();
        function
            .apply(&position, &chunks)
            .unwrap()
            .to_double_array()
            .unwrap()
    }

    #[test]
    fn test_sum_of_inputs() {
        let float = ChunkFormat::new(DataType::Float);
        let (function, collector) = compile(
            "c = a + b",
            vec![input("a", float, &[2.0; 3]), input("b", float, &[4.0; 3])],
            ChunkFormat::new(DataType::Double),
            false,
        )
        .unwrap();
        assert_eq!(function.name(), "c");
        assert_eq!(collector.len(), 2);
        assert_eq!(run(&function, &collector, 3), vec![6.0; 3]);
    }

    #[test]
    fn test_result_adapted_to_output_type() {
        let float = ChunkFormat::new(DataType::Float);
        let (function, collector) = compile(
            "flag = a > 1.5",
            vec![input("a", float, &[1.0, 2.0])],
            ChunkFormat::new(DataType::Byte),
            false,
        )
        .unwrap();
        assert_eq!(run(&function, &collector, 2), vec![0.0, 1.0]);
    }

    #[test]
    fn test_skip_missing_propagates_without_evaluating() {
        let input_format = ChunkFormat::new(DataType::Short).with_missing(Some(-1.0));
        let output = ChunkFormat::new(DataType::Short).with_missing(Some(-9999.0));
        let inputs = vec![input("a", input_format, &[4.0, -1.0, 0.0])];

        let (function, collector) = compile("q = 8 / a", inputs.clone(), output, true).unwrap();
        let values = run(&function, &collector, 3);
        assert_eq!(values[0], 2.0);
        assert!(values[1].is_nan());
        assert!(values[2].is_nan());

        let (function, collector) = compile("q = 8 / a", inputs, output, false).unwrap();
        let values = run(&function, &collector, 3);
        assert_eq!(values[0], 2.0);
        assert_eq!(values[1], -8.0);
        assert!(values[2].is_nan());
    }

    #[test]
    fn test_float_division_by_zero_depends_on_output() {
        let float = ChunkFormat::new(DataType::Float);
        let inputs = vec![input("a", float, &[1.0, -2.0])];

        let (function, collector) =
            compile("q = a / 0.0", inputs.clone(), ChunkFormat::new(DataType::Double), false)
                .unwrap();
        assert!(ChunkFunction::is_thread_safe(&function));
        assert_eq!(run(&function, &collector, 2), vec![f64::INFINITY, f64::NEG_INFINITY]);

        let packed = ChunkFormat::new(DataType::Short)
            .with_missing(Some(-9999.0))
            .with_packing(Some(PackingScheme::new(0.01, 0.0, DataType::Double).unwrap()));
        let (function, collector) = compile("q = a / 0.0", inputs, packed, false).unwrap();
        assert!(run(&function, &collector, 2).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_unresolved_variable_is_compile_error() {
        let err = compile("c = nope * 2", Vec::new(), ChunkFormat::new(DataType::Double), false)
            .unwrap_err();
        assert!(matches!(
            err,
            ChunkError::Expression(ExpressionError::UnresolvedVariable { .. })
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_assignment() {
        let err = compile("a + b", Vec::new(), ChunkFormat::new(DataType::Double), false)
            .unwrap_err();
        assert!(matches!(
            err,
            ChunkError::Expression(ExpressionError::InvalidAssignment(_))
        ));
    }
}
