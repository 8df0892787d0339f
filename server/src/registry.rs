use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::info;

use crate::errors::{Error, Result};
use crate::metrics::{MESSAGE_TYPES_REGISTERED, MESSAGE_TYPES_TOTAL};
use crate::model::Structure;

/// Named message-type schemas. Append-only: entries are never replaced or
/// removed once registered.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<BTreeMap<String, Structure>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name`, failing with `AlreadyExists` if it is taken.
    pub fn register(&self, name: &str, structure: Structure) -> Result<()> {
        let mut schemas = self.schemas.write();
        if schemas.contains_key(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        info!(
            "Registered message type '{}' with {} fields",
            name,
            structure.len()
        );
        schemas.insert(name.to_string(), structure);
        MESSAGE_TYPES_REGISTERED.inc();
        MESSAGE_TYPES_TOTAL.set(schemas.len() as f64);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Structure> {
        self.schemas
            .read()
            .get(name)
            .cloned()
            .ok_or(Error::NotFound("Message type not found"))
    }

    /// Snapshot of every schema, ordered by name.
    pub fn list(&self) -> BTreeMap<String, Structure> {
        self.schemas.read().clone()
    }

    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn position_structure() -> Structure {
        Structure::from_pairs([
            ("x", "float"),
            ("y", "float"),
            ("z", "float"),
            ("position", "float"),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = SchemaRegistry::new();

        assert!(registry.register("positionData", position_structure()).is_ok());
        let second = registry.register("positionData", Structure::default());

        assert!(matches!(second, Err(Error::AlreadyExists(ref n)) if n == "positionData"));
        assert_eq!(registry.len(), 1);
        // The first registration survives the rejected attempt.
        assert_eq!(registry.get("positionData").unwrap(), position_structure());
    }

    #[test]
    fn test_get_unknown() {
        let registry = SchemaRegistry::new();
        assert!(matches!(
            registry.get("missing"),
            Err(Error::NotFound("Message type not found"))
        ));
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = SchemaRegistry::new();
        registry.register("zeta", Structure::default()).unwrap();
        registry.register("alpha", position_structure()).unwrap();

        let names: Vec<String> = registry.list().into_keys().collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_concurrent_registration_has_one_winner() {
        let registry = Arc::new(SchemaRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register("handData", Structure::default()).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }
}
