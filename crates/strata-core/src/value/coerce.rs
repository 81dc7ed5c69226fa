use super::{Value, ValueError};
use chrono::DateTime;
use num_bigint::BigInt;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use strata_schema::{timeuuid, types::FieldType};
use uuid::Uuid;

///
/// Coercion table
///
/// Converts caller-supplied values into the declared column type. Text is
/// accepted for every type so schema-free callers (JSON, CLI) can pass
/// strings; numeric widening is lossless only.
///

impl Value {
    pub fn coerce(self, to: FieldType) -> Result<Self, ValueError> {
        if self.is_null() {
            return Ok(self);
        }

        let mismatch = |v: &Self| ValueError::Mismatch {
            expected: to,
            found: v.label(),
        };

        match to {
            FieldType::Ascii | FieldType::Text | FieldType::VarChar => match self {
                Self::Text(_) => Ok(self),
                Self::Blob(_) => Err(mismatch(&self)),
                other => Ok(Self::Text(other.to_index_string())),
            },

            FieldType::BigInt | FieldType::Counter => {
                let v = match &self {
                    Self::BigInt(v) | Self::Counter(v) | Self::Timestamp(v) => *v,
                    Self::Int(v) => i64::from(*v),
                    Self::VarInt(v) => i64::try_from(v).map_err(|_| mismatch(&self))?,
                    Self::Text(s) => parse(s, to)?,
                    _ => return Err(mismatch(&self)),
                };

                Ok(if to == FieldType::Counter {
                    Self::Counter(v)
                } else {
                    Self::BigInt(v)
                })
            }

            FieldType::Int => match &self {
                Self::Int(_) => Ok(self),
                Self::BigInt(v) | Self::Counter(v) => i32::try_from(*v)
                    .map(Self::Int)
                    .map_err(|_| mismatch(&self)),
                Self::Text(s) => parse(s, to).map(Self::Int),
                _ => Err(mismatch(&self)),
            },

            FieldType::Boolean => match &self {
                Self::Boolean(_) => Ok(self),
                Self::Text(s) => parse(s, to).map(Self::Boolean),
                _ => Err(mismatch(&self)),
            },

            FieldType::Decimal => match &self {
                Self::Decimal(_) => Ok(self),
                Self::BigInt(v) | Self::Counter(v) => Ok(Self::Decimal(Decimal::from(*v))),
                Self::Int(v) => Ok(Self::Decimal(Decimal::from(*v))),
                Self::Double(v) => Decimal::from_f64(*v)
                    .map(Self::Decimal)
                    .ok_or_else(|| mismatch(&self)),
                Self::Text(s) => parse(s, to).map(Self::Decimal),
                _ => Err(mismatch(&self)),
            },

            FieldType::Double => match &self {
                Self::Double(_) => Ok(self),
                Self::Float(v) => Ok(Self::Double(f64::from(*v))),
                Self::Int(v) => Ok(Self::Double(f64::from(*v))),
                Self::BigInt(v) => Ok(Self::Double(widen_i64(*v))),
                Self::Text(s) => parse(s, to).map(Self::Double),
                _ => Err(mismatch(&self)),
            },

            FieldType::Float => match &self {
                Self::Float(_) => Ok(self),
                Self::Double(v) => Ok(Self::Float(narrow_f64(*v))),
                Self::Text(s) => parse(s, to).map(Self::Float),
                _ => Err(mismatch(&self)),
            },

            FieldType::Timestamp => match &self {
                Self::Timestamp(_) => Ok(self),
                Self::BigInt(v) => Ok(Self::Timestamp(*v)),
                Self::Int(v) => Ok(Self::Timestamp(i64::from(*v))),
                Self::Text(s) => parse_timestamp(s).map(Self::Timestamp),
                _ => Err(mismatch(&self)),
            },

            FieldType::Timeuuid => match &self {
                Self::Timeuuid(_) => Ok(self),
                Self::Uuid(id) if timeuuid::is_time_based(id) => Ok(Self::Timeuuid(*id)),
                Self::Text(s) => {
                    let id: Uuid = parse(s, to)?;
                    if timeuuid::is_time_based(&id) {
                        Ok(Self::Timeuuid(id))
                    } else {
                        Err(ValueError::Parse {
                            expected: to,
                            text: s.clone(),
                        })
                    }
                }
                _ => Err(mismatch(&self)),
            },

            FieldType::Uuid => match &self {
                Self::Uuid(_) => Ok(self),
                Self::Timeuuid(id) => Ok(Self::Uuid(*id)),
                Self::Text(s) => parse(s, to).map(Self::Uuid),
                _ => Err(mismatch(&self)),
            },

            FieldType::VarInt => match &self {
                Self::VarInt(_) => Ok(self),
                Self::BigInt(v) | Self::Counter(v) => Ok(Self::VarInt(BigInt::from(*v))),
                Self::Int(v) => Ok(Self::VarInt(BigInt::from(*v))),
                Self::Text(s) => parse(s, to).map(Self::VarInt),
                _ => Err(mismatch(&self)),
            },

            FieldType::Blob => match &self {
                Self::Blob(_) => Ok(self),
                Self::Text(s) => parse_hex(s)
                    .map(Self::Blob)
                    .ok_or_else(|| ValueError::Parse {
                        expected: to,
                        text: s.clone(),
                    }),
                _ => Err(mismatch(&self)),
            },
        }
    }
}

#[expect(clippy::cast_precision_loss)]
const fn widen_i64(v: i64) -> f64 {
    v as f64
}

#[expect(clippy::cast_possible_truncation)]
const fn narrow_f64(v: f64) -> f32 {
    v as f32
}

fn parse<T: std::str::FromStr>(s: &str, expected: FieldType) -> Result<T, ValueError> {
    s.trim().parse().map_err(|_| ValueError::Parse {
        expected,
        text: s.to_string(),
    })
}

/// Milliseconds since the epoch from either an integer string or RFC 3339.
fn parse_timestamp(s: &str) -> Result<i64, ValueError> {
    if let Ok(millis) = s.trim().parse::<i64>() {
        return Ok(millis);
    }

    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| ValueError::Parse {
            expected: FieldType::Timestamp,
            text: s.to_string(),
        })
}

fn parse_hex(s: &str) -> Option<Vec<u8>> {
    let digits = s.trim().strip_prefix("0x").unwrap_or(s.trim());
    if digits.len() % 2 != 0 {
        return None;
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}
