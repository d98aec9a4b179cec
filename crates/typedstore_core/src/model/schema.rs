//! Entity registry a context validates kinds against.
//!
//! # Invariants
//! - Entity names match `^[A-Za-z_][A-Za-z0-9_]*$`.
//! - Names are kept sorted and unique.

use crate::model::object::EntityKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static ENTITY_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid entity name regex"));

/// Data model validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidEntityName(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEntityName(name) => write!(f, "invalid entity name: `{name}`"),
        }
    }
}

impl Error for ModelError {}

/// Set of entity kinds known to a persistence context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModel {
    #[serde(default)]
    entities: BTreeSet<String>,
}

impl DataModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the entity kind witnessed by `T`.
    pub fn with_kind<T: EntityKind>(self) -> Self {
        self.with_entity(T::ENTITY_NAME)
    }

    /// Adds one entity name.
    pub fn with_entity(mut self, name: impl Into<String>) -> Self {
        self.entities.insert(name.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains(name)
    }

    /// Returns sorted entity names.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Checks every registered name.
    pub fn validate(&self) -> Result<(), ModelError> {
        match self.entities.iter().find(|name| !is_valid_entity_name(name)) {
            Some(name) => Err(ModelError::InvalidEntityName(name.clone())),
            None => Ok(()),
        }
    }
}

/// Returns whether `name` can address an entity schema.
pub fn is_valid_entity_name(name: &str) -> bool {
    ENTITY_NAME_RE.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::{is_valid_entity_name, DataModel, ModelError};

    #[test]
    fn validate_rejects_names_with_spaces_or_leading_digits() {
        assert!(is_valid_entity_name("User"));
        assert!(is_valid_entity_name("_audit_log2"));
        assert!(!is_valid_entity_name("2fa"));
        assert!(!is_valid_entity_name("order item"));
        assert!(!is_valid_entity_name(""));

        let model = DataModel::new().with_entity("User").with_entity("bad name");
        assert_eq!(
            model.validate(),
            Err(ModelError::InvalidEntityName("bad name".to_string()))
        );
    }

    #[test]
    fn model_deserializes_from_entity_list() {
        let model: DataModel =
            serde_json::from_str(r#"{"entities":["Order","User","Order"]}"#).unwrap();
        assert_eq!(model.entity_names().collect::<Vec<_>>(), ["Order", "User"]);
    }
}
