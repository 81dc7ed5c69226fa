use crate::types::FieldType;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// Field
/// A named, typed column. Immutable once part of a published schema.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Field {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.field_type)
    }
}
