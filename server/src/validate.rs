use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::errors::{Error, Result};
use crate::model::{kind_of, Structure, TypeTag};
use crate::registry::SchemaRegistry;

/// Anything schemas can be looked up in: the live registry on the server, or
/// the listing a client fetched from `/message-types`.
pub trait SchemaSource {
    fn schema(&self, name: &str) -> Option<Structure>;
}

impl SchemaSource for SchemaRegistry {
    fn schema(&self, name: &str) -> Option<Structure> {
        self.get(name).ok()
    }
}

impl SchemaSource for BTreeMap<String, Structure> {
    fn schema(&self, name: &str) -> Option<Structure> {
        self.get(name).cloned()
    }
}

/// Validates `payload` against the message type registered as `name`.
pub fn validate<S>(schemas: &S, name: &str, payload: &Value) -> Result<()>
where
    S: SchemaSource + ?Sized,
{
    validate_structure(&lookup(schemas, name)?, payload)
}

/// Same as [`validate`] for a payload that is already known to be an object.
pub fn validate_object<S>(schemas: &S, name: &str, object: &Map<String, Value>) -> Result<()>
where
    S: SchemaSource + ?Sized,
{
    check_fields(&lookup(schemas, name)?, object)
}

fn lookup<S>(schemas: &S, name: &str) -> Result<Structure>
where
    S: SchemaSource + ?Sized,
{
    schemas
        .schema(name)
        .ok_or_else(|| Error::UnknownMessageType(name.to_string()))
}

/// Checks declared fields in order. Undeclared payload fields are ignored.
pub fn validate_structure(structure: &Structure, payload: &Value) -> Result<()> {
    let object = payload.as_object().ok_or_else(|| Error::TypeMismatch {
        field: "<payload>".to_string(),
        expected: TypeTag::Object.name(),
        actual: kind_of(payload),
    })?;
    check_fields(structure, object)
}

fn check_fields(structure: &Structure, object: &Map<String, Value>) -> Result<()> {
    for field in structure.fields() {
        let value = object
            .get(&field.name)
            .ok_or_else(|| Error::MissingField(field.name.clone()))?;

        if !field.tag.matches(value) {
            return Err(Error::TypeMismatch {
                field: field.name.clone(),
                expected: field.tag.name(),
                actual: kind_of(value),
            });
        }
    }

    Ok(())
}
