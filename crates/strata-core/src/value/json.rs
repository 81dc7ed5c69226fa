use super::{Row, Value, ValueError};
use serde_json::{Map, Number, Value as JsonValue};
use strata_schema::definition::ObjectDefinition;

impl Value {
    /// JSON form used in change-log snapshots and caller-facing maps.
    ///
    /// Values with no lossless JSON number form (decimals, varints, blobs,
    /// ids) are written as strings and recovered through [`Value::coerce`].
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::BigInt(v) | Self::Counter(v) | Self::Timestamp(v) => JsonValue::from(*v),
            Self::Boolean(v) => JsonValue::Bool(*v),
            Self::Double(v) => Number::from_f64(*v).map_or(JsonValue::Null, JsonValue::Number),
            Self::Float(v) => {
                Number::from_f64(f64::from(*v)).map_or(JsonValue::Null, JsonValue::Number)
            }
            Self::Int(v) => JsonValue::from(*v),
            Self::Null => JsonValue::Null,
            Self::Text(s) => JsonValue::String(s.clone()),
            other => JsonValue::String(other.to_index_string()),
        }
    }

    /// Untyped conversion from JSON; pair with [`Value::coerce`] to reach a
    /// column type.
    #[must_use]
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Boolean(*v),
            JsonValue::Number(n) => n
                .as_i64()
                .map(Self::BigInt)
                .or_else(|| n.as_f64().map(Self::Double))
                .unwrap_or(Self::Null),
            JsonValue::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

/// Serialize a row as a JSON object with sorted keys.
#[must_use]
pub fn row_to_json(row: &Row) -> JsonValue {
    JsonValue::Object(
        row.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<Map<_, _>>(),
    )
}

/// Parse a JSON object into a row typed by the definition's fields.
/// Keys with no matching field are kept as untyped values.
pub fn row_from_json(def: &ObjectDefinition, json: &JsonValue) -> Result<Row, ValueError> {
    let Some(object) = json.as_object() else {
        return Ok(Row::new());
    };

    object
        .iter()
        .map(|(name, raw)| {
            let value = Value::from_json(raw);
            let value = match def.field(name) {
                Some(field) => value.coerce(field.field_type)?,
                None => value,
            };

            Ok((name.clone(), value))
        })
        .collect()
}
