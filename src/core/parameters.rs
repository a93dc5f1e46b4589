//! Pipeline parameters

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// Type tag of a pipeline parameter, named as in Python
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
    Str,
    Bool,
}

impl ParamType {
    /// Python type annotation
    pub fn python_name(&self) -> &'static str {
        match self {
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Str => "str",
            ParamType::Bool => "bool",
        }
    }
}

/// Literal default value of a parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Str(_) => ParamType::Str,
            ParamValue::Bool(_) => ParamType::Bool,
        }
    }

    /// Render as Python source
    pub fn to_python(&self) -> String {
        match self {
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => python_float(*f),
            ParamValue::Str(s) => python_str(s),
            ParamValue::Bool(true) => "True".to_string(),
            ParamValue::Bool(false) => "False".to_string(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_python()),
        }
    }
}

fn python_float(f: f64) -> String {
    if f.is_nan() {
        "float('nan')".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "float('inf')" } else { "float('-inf')" }.to_string()
    } else {
        // Debug formatting always keeps a decimal point or exponent
        format!("{:?}", f)
    }
}

/// Quote a string as a single-quoted Python literal
pub fn python_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32))
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// A single pipeline parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub default: ParamValue,
}

/// Ordered mapping of parameter name to type and default
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSet {
    params: IndexMap<String, Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or override a parameter, keeping its original position
    pub fn insert(&mut self, name: &str, value: ParamValue) {
        let param = Parameter {
            name: name.to_string(),
            param_type: value.param_type(),
            default: value,
        };
        self.params.insert(name.to_string(), param);
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_rendering() {
        assert_eq!(ParamValue::Int(-3).to_python(), "-3");
        assert_eq!(ParamValue::Float(2.0).to_python(), "2.0");
        assert_eq!(ParamValue::Float(0.001).to_python(), "0.001");
        assert_eq!(ParamValue::Bool(true).to_python(), "True");
        assert_eq!(ParamValue::Str("it's\n".to_string()).to_python(), "'it\\'s\\n'");
    }

    #[test]
    fn test_override_keeps_position() {
        let mut params = ParameterSet::new();
        params.insert("a", ParamValue::Int(1));
        params.insert("b", ParamValue::Str("x".to_string()));
        params.insert("a", ParamValue::Float(0.5));

        let names: Vec<_> = params.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(params.get("a").unwrap().param_type, ParamType::Float);
    }
}
