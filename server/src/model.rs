use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::{Error, Result};

/// Primitive kind a schema field may require.
///
/// The set is closed: tags are resolved through [`TypeTag::parse`] and never
/// interpreted any other way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Array,
}

impl TypeTag {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "str" | "string" => Some(TypeTag::String),
            "int" | "integer" => Some(TypeTag::Integer),
            "float" | "number" => Some(TypeTag::Float),
            "bool" | "boolean" => Some(TypeTag::Boolean),
            "dict" | "object" => Some(TypeTag::Object),
            "list" | "array" => Some(TypeTag::Array),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::Boolean => "boolean",
            TypeTag::Object => "object",
            TypeTag::Array => "array",
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        kind_of(value) == self.name()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime kind of a JSON value, named like the canonical tags.
///
/// Numbers without a fraction or exponent are `integer`, all others `float`.
/// Integer literals outside the `i64`/`u64` range are parsed as `f64` and so
/// report `float`; devices needing wider integers should send them as strings.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Field declarations of a message type, in declaration order.
///
/// Serializes as a JSON object keyed by field name. Each field keeps the tag
/// spelling it was registered with, so listings echo what callers sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Structure {
    fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub tag: TypeTag,
    spelling: String,
}

impl Structure {
    /// Builds a structure from raw `(field, tag)` pairs, rejecting unknown tags.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut fields: Vec<Field> = Vec::new();
        for (name, spelling) in pairs {
            let name = name.into();
            let spelling = spelling.into();
            let tag = TypeTag::parse(&spelling).ok_or_else(|| Error::UnsupportedTypeTag {
                field: name.clone(),
                tag: spelling.clone(),
            })?;
            // A repeated key keeps its first position but takes the last tag,
            // mirroring how JSON objects resolve duplicates.
            match fields.iter_mut().find(|f| f.name == name) {
                Some(existing) => {
                    existing.tag = tag;
                    existing.spelling = spelling;
                }
                None => fields.push(Field { name, tag, spelling }),
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Structure {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(&field.name, &field.spelling)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Structure {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StructureVisitor;

        impl<'de> Visitor<'de> for StructureVisitor {
            type Value = Structure;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field name to type tag")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Structure, A::Error> {
                let mut pairs: Vec<(String, String)> = Vec::new();
                while let Some((name, tag)) = access.next_entry::<String, String>()? {
                    pairs.push((name, tag));
                }
                Structure::from_pairs(pairs).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_map(StructureVisitor)
    }
}

/// Request body for registering a message type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageType {
    pub name: String,
    pub structure: Structure,
}

/// Registration body as it arrives on the wire, before tags are resolved.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub structure: Map<String, Value>,
}

impl RegisterRequest {
    pub fn into_message_type(self) -> Result<MessageType> {
        let pairs = self
            .structure
            .into_iter()
            .map(|(field, tag)| match tag {
                Value::String(tag) => Ok((field, tag)),
                other => Err(Error::UnsupportedTypeTag {
                    field,
                    tag: other.to_string(),
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MessageType {
            name: self.name,
            structure: Structure::from_pairs(pairs)?,
        })
    }
}

/// One ingestion event from a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    pub sensor_data: Map<String, Value>,
    /// Schema to check `sensor_data` against when ingest validation is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
}

impl Reading {
    pub fn new(device_id: impl Into<String>, sensor_data: Map<String, Value>) -> Self {
        Self {
            device_id: device_id.into(),
            sensor_data,
            message_type: None,
        }
    }

    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }
}

/// What the store keeps for one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeviceRecord {
    Latest(Value),
    History(Vec<Value>),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
