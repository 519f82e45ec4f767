//! Records held by the in-memory store.

use std::collections::BTreeMap;

use labsearch::{EntityId, Value};

#[cfg(feature = "persistence")]
use serde::{Deserialize, Serialize};

/// Reference from one record to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "persistence", derive(Serialize, Deserialize))]
pub struct RecordRef {
    /// Entity type of the target.
    pub entity: String,
    /// Id of the target.
    pub id: EntityId,
}

/// One stored entity: scalar fields plus named associations.
///
/// The id property of the record's entity type is answered from
/// [`Record::id`]; it does not need to be set as a field.
///
/// # Example
///
/// ```rust
/// use labsearch::Value;
/// use labsearch_memstore::Record;
///
/// let tube = Record::new("LabVessel", 1)
///     .with_field("label", "0123")
///     .with_link("mercurySamples", "MercurySample", 10);
///
/// assert_eq!(tube.field("label"), Some(&Value::from("0123")));
/// assert_eq!(tube.links("mercurySamples").len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persistence", derive(Serialize, Deserialize))]
pub struct Record {
    /// Entity type.
    pub entity: String,
    /// Primary key.
    pub id: EntityId,
    #[cfg_attr(feature = "persistence", serde(default))]
    fields: BTreeMap<String, Value>,
    #[cfg_attr(feature = "persistence", serde(default))]
    links: BTreeMap<String, Vec<RecordRef>>,
}

impl Record {
    /// Creates a record without fields or links.
    pub fn new(entity: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
            fields: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// Sets a scalar field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Adds one target to an association.
    pub fn with_link(
        mut self,
        association: impl Into<String>,
        entity: impl Into<String>,
        id: impl Into<EntityId>,
    ) -> Self {
        self.links.entry(association.into()).or_default().push(RecordRef {
            entity: entity.into(),
            id: id.into(),
        });
        self
    }

    /// Returns a scalar field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// All scalar fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Targets of an association; empty when the association is unset.
    pub fn links(&self, association: &str) -> &[RecordRef] {
        self.links.get(association).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names of the associations that have targets.
    pub fn associations(&self) -> impl Iterator<Item = &str> {
        self.links.keys().map(String::as_str)
    }
}
