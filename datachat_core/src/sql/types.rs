use serde::{Deserialize, Serialize};
use std::fmt;

/// Column type inferred from the CSV contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Real,
    Text,
}

impl DataType {
    /// Declared type used for the SQLite column.
    pub fn sql_name(&self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Real => "REAL",
            DataType::Text => "TEXT",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Real)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Integer => "integer",
            DataType::Real => "real",
            DataType::Text => "text",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
}

impl Value {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Integer(_) => Some(DataType::Integer),
            Value::Real(_) => Some(DataType::Real),
            Value::Text(_) => Some(DataType::Text),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// True when the printed value is a non-empty run of ASCII digits.
    pub fn is_digit_string(&self) -> bool {
        match self {
            Value::Integer(i) => *i >= 0,
            Value::Text(s) => !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    /// Rough in-memory footprint, used for the memory usage estimate.
    pub fn approx_size(&self) -> usize {
        match self {
            Value::Text(s) => std::mem::size_of::<String>() + s.len(),
            _ => std::mem::size_of::<Value>(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            // Keep a trailing `.0` on whole reals so they read as reals.
            Value::Real(r) if r.is_finite() && r.fract() == 0.0 && r.abs() < 1e16 => {
                write!(f, "{:.1}", r)
            }
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => f.write_str(s),
            Value::Null => f.write_str("NULL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

/// Statement accepted by the executor's guard.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Query { tables: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_display_keeps_decimal_point() {
        assert_eq!(Value::Real(3.0).to_string(), "3.0");
        assert_eq!(Value::Real(2.5).to_string(), "2.5");
        assert_eq!(Value::Integer(7).to_string(), "7");
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn test_digit_strings() {
        assert!(Value::Text("0042".to_string()).is_digit_string());
        assert!(Value::Integer(12).is_digit_string());
        assert!(!Value::Integer(-1).is_digit_string());
        assert!(!Value::Text("".to_string()).is_digit_string());
        assert!(!Value::Text("1.5".to_string()).is_digit_string());
        assert!(!Value::Real(1.0).is_digit_string());
        assert!(!Value::Null.is_digit_string());
    }

    #[test]
    fn test_value_json_is_untagged() {
        let json = serde_json::to_string(&vec![
            Value::Integer(1),
            Value::Real(1.5),
            Value::Text("a".to_string()),
            Value::Null,
        ])
        .unwrap();
        assert_eq!(json, r#"[1,1.5,"a",null]"#);
    }
}
