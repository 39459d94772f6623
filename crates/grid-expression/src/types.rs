//! Value types produced and consumed by compiled expressions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Static type of an expression node or variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl ValueType {
    /// Parse a type keyword as written in a cast, eg `(short)`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "boolean" => Some(Self::Boolean),
            "byte" => Some(Self::Byte),
            "short" => Some(Self::Short),
            "int" => Some(Self::Int),
            "long" => Some(Self::Long),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Boolean)
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Promotion applied to the operand of a unary numeric operator.
    pub fn unary_promote(self) -> Option<Self> {
        match self {
            Self::Boolean => None,
            Self::Byte | Self::Short | Self::Int => Some(Self::Int),
            other => Some(other),
        }
    }

    /// Promotion applied to the operands of a binary numeric operator.
    pub fn binary_promote(a: Self, b: Self) -> Option<Self> {
        if !a.is_numeric() || !b.is_numeric() {
            return None;
        }
        Some(if a == Self::Double || b == Self::Double {
            Self::Double
        } else if a == Self::Float || b == Self::Float {
            Self::Float
        } else if a == Self::Long || b == Self::Long {
            Self::Long
        } else {
            Self::Int
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single typed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Boolean(_) => ValueType::Boolean,
            Self::Byte(_) => ValueType::Byte,
            Self::Short(_) => ValueType::Short,
            Self::Int(_) => ValueType::Int,
            Self::Long(_) => ValueType::Long,
            Self::Float(_) => ValueType::Float,
            Self::Double(_) => ValueType::Double,
        }
    }

    /// Widen to double. Booleans become 1.0 or 0.0.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Boolean(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Byte(v) => v as f64,
            Self::Short(v) => v as f64,
            Self::Int(v) => v as f64,
            Self::Long(v) => v as f64,
            Self::Float(v) => v as f64,
            Self::Double(v) => v,
        }
    }

    /// Convert to long. Floating point values truncate toward zero and
    /// saturate, with NaN becoming zero.
    pub fn as_i64(&self) -> i64 {
        match *self {
            Self::Boolean(b) => b as i64,
            Self::Byte(v) => v as i64,
            Self::Short(v) => v as i64,
            Self::Int(v) => v as i64,
            Self::Long(v) => v,
            Self::Float(v) => v as i64,
            Self::Double(v) => v as i64,
        }
    }

    pub fn as_bool(&self) -> bool {
        match *self {
            Self::Boolean(b) => b,
            other => other.as_f64() != 0.0,
        }
    }

    /// Truncate toward zero into an int, the first step of any
    /// floating point narrowing to byte, short or int.
    fn as_i32(&self) -> i32 {
        match *self {
            Self::Float(v) => v as i32,
            Self::Double(v) => v as i32,
            other => other.as_i64() as i32,
        }
    }

    /// Convert to another type using primitive cast rules: integer
    /// narrowing wraps, floating point to integer truncates and saturates
    /// at int or long range.
    pub fn cast(self, to: ValueType) -> Value {
        match to {
            ValueType::Boolean => Value::Boolean(self.as_bool()),
            ValueType::Byte => Value::Byte(self.as_i32() as i8),
            ValueType::Short => Value::Short(self.as_i32() as i16),
            ValueType::Int => Value::Int(self.as_i32()),
            ValueType::Long => Value::Long(self.as_i64()),
            ValueType::Float => Value::Float(match self {
                Value::Double(v) => v as f32,
                Value::Long(v) => v as f32,
                other => other.as_f64() as f32,
            }),
            ValueType::Double => Value::Double(self.as_f64()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_promotion() {
        use ValueType::*;
        assert_eq!(ValueType::binary_promote(Byte, Short), Some(Int));
        assert_eq!(ValueType::binary_promote(Int, Long), Some(Long));
        assert_eq!(ValueType::binary_promote(Long, Float), Some(Float));
        assert_eq!(ValueType::binary_promote(Float, Double), Some(Double));
        assert_eq!(ValueType::binary_promote(Boolean, Int), None);
    }

    #[test]
    fn test_cast_narrowing_wraps() {
        assert_eq!(Value::Int(300).cast(ValueType::Byte), Value::Byte(44));
        assert_eq!(Value::Double(70000.7).cast(ValueType::Short), Value::Short(4464));
        assert_eq!(Value::Double(f64::NAN).cast(ValueType::Int), Value::Int(0));
        assert_eq!(Value::Double(1e20).cast(ValueType::Int), Value::Int(i32::MAX));
    }

    #[test]
    fn test_boolean_widening() {
        assert_eq!(Value::Boolean(true).as_f64(), 1.0);
        assert_eq!(Value::Boolean(false).cast(ValueType::Double), Value::Double(0.0));
    }

    #[test]
    fn test_type_keywords() {
        assert_eq!(ValueType::from_str("short"), Some(ValueType::Short));
        assert_eq!(ValueType::from_str("Short"), None);
        assert_eq!(ValueType::Long.to_string(), "long");
    }
}
