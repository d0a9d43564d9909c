// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value types and the conversion registry.
//!
//! Every point is typed by name. The registry maps each name to a conversion
//! function and to the set of types it accepts connections from. A
//! conversion returning `None` means the value cannot be represented in the
//! type; `Value::Null` is type-agnostic and never reaches a converter.

use crate::error::{GraphError, Result};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Conversion function of a value type
pub type ConvertFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// A registered value type
#[derive(Clone)]
pub struct ValueTypeInfo {
    name: String,
    convert: ConvertFn,
    compatible_from: IndexSet<String>,
}

impl ValueTypeInfo {
    /// Create a value type with its conversion function
    pub fn new(
        name: impl Into<String>,
        convert: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            convert: Arc::new(convert),
            compatible_from: IndexSet::new(),
        }
    }

    /// Declare the types that may be connected into this one
    pub fn with_compatible_from<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compatible_from.extend(types.into_iter().map(Into::into));
        self
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Convert a non-null value, `None` on failure
    pub fn convert(&self, value: &Value) -> Option<Value> {
        (self.convert)(value)
    }

    /// Types this one accepts connections from
    pub fn compatible_from(&self) -> &IndexSet<String> {
        &self.compatible_from
    }

    /// Whether a point of type `source` may be connected into this type
    pub fn accepts_from(&self, source: &str) -> bool {
        self.compatible_from.contains(source)
    }
}

impl fmt::Debug for ValueTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueTypeInfo")
            .field("name", &self.name)
            .field("compatible_from", &self.compatible_from)
            .finish_non_exhaustive()
    }
}

/// Registry of value types known to a graph
#[derive(Debug, Clone, Default)]
pub struct ValueTypeRegistry {
    types: IndexMap<String, ValueTypeInfo>,
}

impl ValueTypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the builtin types
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for info in builtin::types() {
            registry.types.insert(info.name.clone(), info);
        }
        registry
    }

    /// Register a value type, failing if the name is taken
    pub fn register(&mut self, info: ValueTypeInfo) -> Result<()> {
        if self.types.contains_key(&info.name) {
            return Err(GraphError::ValueTypeRedefinition(info.name));
        }
        tracing::debug!("Registered value type {}", info.name);
        self.types.insert(info.name.clone(), info);
        Ok(())
    }

    /// Get a value type by name
    pub fn get(&self, name: &str) -> Option<&ValueTypeInfo> {
        self.types.get(name)
    }

    /// Get a value type, failing if unknown
    pub fn require(&self, name: &str) -> Result<&ValueTypeInfo> {
        self.get(name)
            .ok_or_else(|| GraphError::UnknownValueType(name.to_string()))
    }

    /// Whether the type is registered
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no type is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Convert `value` into `value_type`.
    ///
    /// Null passes through without consulting the type.
    pub fn convert_value(&self, value_type: &str, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let info = self.require(value_type)?;
        info.convert(value).ok_or_else(|| GraphError::ConversionFailed {
            value_type: value_type.to_string(),
            value: value.clone(),
        })
    }

    /// Dry run of [`Self::convert_value`]
    pub fn can_convert(&self, value_type: &str, value: &Value) -> bool {
        self.convert_value(value_type, value).is_ok()
    }

    /// Whether `source` is declared convertible into `target`
    pub fn is_compatible(&self, source: &str, target: &str) -> bool {
        self.get(target).is_some_and(|info| info.accepts_from(source))
    }
}

/// Builtin value types and their conversions
pub mod builtin {
    use super::ValueTypeInfo;
    use serde_json::{Number, Value};

    /// Conversion function signature of the builtins
    pub type Converter = fn(&Value) -> Option<Value>;

    /// Names of the builtin types
    pub const NAMES: [&str; 8] = [
        "Stream", "String", "Text", "Number", "Boolean", "Object", "Array", "Resource",
    ];

    /// All builtin types
    pub fn types() -> Vec<ValueTypeInfo> {
        vec![
            ValueTypeInfo::new("Stream", stream),
            ValueTypeInfo::new("String", string).with_compatible_from(["Text", "Number", "Boolean"]),
            ValueTypeInfo::new("Text", string).with_compatible_from(["String", "Number", "Boolean"]),
            ValueTypeInfo::new("Number", number).with_compatible_from(["Boolean"]),
            ValueTypeInfo::new("Boolean", boolean).with_compatible_from(["Number"]),
            ValueTypeInfo::new("Object", object),
            ValueTypeInfo::new("Array", array),
            ValueTypeInfo::new("Resource", object),
        ]
    }

    /// Look up the converter of a builtin type by name
    pub fn converter(name: &str) -> Option<Converter> {
        let converter: Converter = match name {
            "Stream" => stream,
            "String" | "Text" => string,
            "Number" => number,
            "Boolean" => boolean,
            "Object" | "Resource" => object,
            "Array" => array,
            _ => return None,
        };
        Some(converter)
    }

    /// Streams carry no literal value
    pub fn stream(_value: &Value) -> Option<Value> {
        None
    }

    /// Strings, numbers and booleans as text
    pub fn string(value: &Value) -> Option<Value> {
        match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        }
    }

    /// Numbers, decimal strings and booleans (as 1/0)
    pub fn number(value: &Value) -> Option<Value> {
        match value {
            Value::Number(_) => Some(value.clone()),
            Value::Bool(b) => Some(Value::from(u8::from(*b))),
            Value::String(s) => parse_decimal(s),
            _ => None,
        }
    }

    /// Booleans, numbers (non-zero is true) and `"true"`/`"false"`
    pub fn boolean(value: &Value) -> Option<Value> {
        match value {
            Value::Bool(_) => Some(value.clone()),
            Value::Number(n) => n.as_f64().map(|f| Value::Bool(f != 0.0)),
            Value::String(s) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Objects only
    pub fn object(value: &Value) -> Option<Value> {
        value.is_object().then(|| value.clone())
    }

    /// Arrays only
    pub fn array(value: &Value) -> Option<Value> {
        value.is_array().then(|| value.clone())
    }

    // Accepts `[-+]?digits(.digits*)?` and nothing else.
    fn parse_decimal(text: &str) -> Option<Value> {
        let unsigned = text.strip_prefix(|c: char| c == '-' || c == '+').unwrap_or(text);
        let (integer, fraction) = match unsigned.split_once('.') {
            Some((integer, fraction)) => (integer, Some(fraction)),
            None => (unsigned, None),
        };
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if integer.is_empty() || !all_digits(integer) {
            return None;
        }
        match fraction {
            None => match text.parse::<i64>() {
                Ok(n) => Some(Value::from(n)),
                Err(_) => float(text),
            },
            Some(fraction) if all_digits(fraction) => float(text),
            Some(_) => None,
        }
    }

    fn float(text: &str) -> Option<Value> {
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
    }
}
