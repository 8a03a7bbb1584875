use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use super::error::{EventSourcingError, Result};

// ============================================================================
// Tuple Schema - named, typed slots
// ============================================================================
//
// A Schema is an ordered list of slots sorted by name, so two variants with
// the same fields in a different declaration order get the same schema.
// A Tuple is one instance of a Schema; values are only ever addressed by
// slot name.
//
// ============================================================================

/// Type descriptor for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Uuid,
    Optional(Box<SlotType>),
    List(Box<SlotType>),
    Json,
}

impl SlotType {
    pub fn optional(inner: SlotType) -> Self {
        SlotType::Optional(Box::new(inner))
    }

    pub fn list(inner: SlotType) -> Self {
        SlotType::List(Box::new(inner))
    }

    /// Whether a serialized value conforms to this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            SlotType::String => value.is_string(),
            SlotType::Integer => value.is_i64() || value.is_u64(),
            SlotType::Float => value.is_number(),
            SlotType::Boolean => value.is_boolean(),
            SlotType::Timestamp => value
                .as_str()
                .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false),
            SlotType::Uuid => value
                .as_str()
                .map(|s| uuid::Uuid::parse_str(s).is_ok())
                .unwrap_or(false),
            SlotType::Optional(inner) => value.is_null() || inner.accepts(value),
            SlotType::List(inner) => value
                .as_array()
                .map(|items| items.iter().all(|item| inner.accepts(item)))
                .unwrap_or(false),
            SlotType::Json => true,
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::String => write!(f, "String"),
            SlotType::Integer => write!(f, "Integer"),
            SlotType::Float => write!(f, "Float"),
            SlotType::Boolean => write!(f, "Boolean"),
            SlotType::Timestamp => write!(f, "Timestamp"),
            SlotType::Uuid => write!(f, "Uuid"),
            SlotType::Optional(inner) => write!(f, "Optional<{}>", inner),
            SlotType::List(inner) => write!(f, "List<{}>", inner),
            SlotType::Json => write!(f, "Json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub name: String,
    pub slot_type: SlotType,
}

impl Slot {
    pub fn of(name: impl Into<String>, slot_type: SlotType) -> Self {
        Self {
            name: name.into(),
            slot_type,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.slot_type)
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    slots: Vec<Slot>,
    lookup: HashMap<String, usize>,
}

impl Schema {
    /// Build a schema, sorting slots by name. Slot names must be unique.
    pub fn of(name: impl Into<String>, mut slots: Vec<Slot>) -> Result<Self> {
        let name = name.into();
        slots.sort_by(|a, b| a.name.cmp(&b.name));

        let mut lookup = HashMap::with_capacity(slots.len());
        for (index, slot) in slots.iter().enumerate() {
            if lookup.insert(slot.name.clone(), index).is_some() {
                return Err(EventSourcingError::DuplicateSlot {
                    schema: name,
                    slot: slot.name.clone(),
                });
            }
        }

        Ok(Self { name, slots, lookup })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.lookup.get(name).map(|&index| &self.slots[index])
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Make a tuple from name/value pairs, checking that every slot is filled
    /// exactly once with a value of the declared type.
    pub fn make(self: &Arc<Self>, values: Vec<(String, Value)>) -> Result<Tuple> {
        let mut filled: Vec<Option<Value>> = vec![None; self.slots.len()];
        let mut unexpected = Vec::new();

        for (name, value) in values {
            match self.lookup.get(&name) {
                Some(&index) => {
                    let slot = &self.slots[index];
                    if !slot.slot_type.accepts(&value) {
                        return Err(EventSourcingError::SlotTypeMismatch {
                            schema: self.name.clone(),
                            slot: name,
                            expected: slot.slot_type.clone(),
                            value: value.to_string(),
                        });
                    }
                    filled[index] = Some(value);
                }
                None => unexpected.push(name),
            }
        }

        let missing: Vec<String> = filled
            .iter()
            .zip(&self.slots)
            .filter(|(value, _)| value.is_none())
            .map(|(_, slot)| slot.name.clone())
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(EventSourcingError::IncompleteTuple {
                schema: self.name.clone(),
                missing,
                unexpected,
            });
        }

        Ok(Tuple {
            schema: Arc::clone(self),
            values: filled.into_iter().flatten().collect(),
        })
    }

    pub fn slot_names(&self) -> BTreeSet<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.slots == other.slots
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", slot)?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// Tuple - an instance of a Schema
// ============================================================================

#[derive(Debug, Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Tuple {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.schema.lookup.get(name).map(|&index| &self.values[index])
    }

    /// Read a slot as a typed value
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .get_value(name)
            .ok_or_else(|| EventSourcingError::SchemaMismatch {
                schema: self.schema.name.clone(),
                slot: name.to_string(),
            })?;

        serde_json::from_value(value.clone()).map_err(|_| EventSourcingError::SlotTypeMismatch {
            schema: self.schema.name.clone(),
            slot: name.to_string(),
            expected: self
                .schema
                .slot(name)
                .map(|s| s.slot_type.clone())
                .unwrap_or(SlotType::Json),
            value: value.to_string(),
        })
    }

    /// Slot name/value pairs in schema order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .slots
            .iter()
            .map(|s| s.name.as_str())
            .zip(self.values.iter())
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.values == other.values
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.schema.name)?;
        for (i, (name, value)) in self.entries().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Collects field values while a variant is encoded.
pub struct TupleWriter {
    schema: Arc<Schema>,
    values: Vec<(String, Value)>,
}

impl TupleWriter {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            values: Vec::new(),
        }
    }

    pub fn put<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<&mut Self> {
        self.values.push((name.to_string(), serde_json::to_value(value)?));
        Ok(self)
    }

    pub fn finish(self) -> Result<Tuple> {
        self.schema.make(self.values)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
