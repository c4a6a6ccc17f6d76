//! Conversion of decoded document values into flat strings.
//!
//! The remote service accepts every tag and parameter value as a plain
//! string, with list parameters encoded as comma-separated strings. Commas
//! are therefore reserved as the list separator inside lists.

use serde_yaml::{Number, Value};
use thiserror::Error;

/// Why a value could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoerceError {
    /// The value contains a comma where commas are not allowed.
    #[error("Commas not allowed in value \"{value}\"")]
    InvalidValue {
        /// The offending value.
        value: String,
    },

    /// The value has a shape that has no string form.
    #[error("Field of type {type_name} is not allowed")]
    UnsupportedType {
        /// Name of the rejected shape.
        type_name: &'static str,
    },
}

/// Controls which shapes a conversion accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoerceOptions {
    /// Accept lists, joined with commas.
    pub allow_slices: bool,
    /// Accept commas inside scalar strings.
    pub allow_commas: bool,
}

impl CoerceOptions {
    /// Rules for tag values.
    pub const TAGS: Self = Self {
        allow_slices: false,
        allow_commas: true,
    };

    /// Rules for parameter values.
    pub const PARAMETERS: Self = Self {
        allow_slices: true,
        allow_commas: true,
    };

    /// Rules for each element of a list.
    pub const LIST_ELEMENT: Self = Self {
        allow_slices: false,
        allow_commas: false,
    };
}

/// Converts a decoded value into its string encoding.
///
/// # Errors
///
/// Returns [`CoerceError::InvalidValue`] for a disallowed comma and
/// [`CoerceError::UnsupportedType`] for maps, nulls, tagged values and
/// disallowed or nested lists.
pub fn coerce_value(value: &Value, options: CoerceOptions) -> Result<String, CoerceError> {
    match value {
        Value::Sequence(items) if options.allow_slices => {
            let elements = items
                .iter()
                .map(|item| coerce_value(item, CoerceOptions::LIST_ELEMENT))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(elements.join(","))
        }
        Value::String(s) => {
            if !options.allow_commas && s.contains(',') {
                return Err(CoerceError::InvalidValue { value: s.clone() });
            }
            Ok(s.clone())
        }
        Value::Number(n) => Ok(format_number(n)),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(CoerceError::UnsupportedType {
            type_name: type_name(other),
        }),
    }
}

/// Shortest exact decimal form of a number, never in exponent notation.
fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        // f64's Display is the shortest round-tripping form without an exponent
        n.as_f64().map_or_else(|| n.to_string(), |f| f.to_string())
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "map",
        Value::Tagged(_) => "tagged value",
    }
}
