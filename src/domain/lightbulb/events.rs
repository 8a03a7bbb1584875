use crate::event_sourcing::core::{
    EventHierarchy, Result, SlotType, Tuple, TupleWriter, VariantSpec,
};

// ============================================================================
// Lightbulb Events - Domain Events for the Lightbulb Aggregate
// ============================================================================

/// Lightbulb Event - Union type for all lightbulb events.
/// Aggregate type derives to `lightbulb`.
#[derive(Debug, Clone, PartialEq)]
pub enum LightbulbEvent {
    /// Initial event in the lightbulb lifecycle
    Created { wattage: i64 },
    ScrewedIn { location: String },
    Unscrewed,
    SwitchedOn,
    SwitchedOff,
}

impl EventHierarchy for LightbulbEvent {
    const HIERARCHY_NAME: &'static str = "LightbulbEvent";

    fn variants() -> Vec<VariantSpec<Self>> {
        vec![
            VariantSpec::new("Created", |t: &Tuple| {
                Ok(LightbulbEvent::Created {
                    wattage: t.get("wattage")?,
                })
            })
            .initial()
            .field("wattage", SlotType::Integer),
            VariantSpec::new("ScrewedIn", |t: &Tuple| {
                Ok(LightbulbEvent::ScrewedIn {
                    location: t.get("location")?,
                })
            })
            .field("location", SlotType::String),
            VariantSpec::new("Unscrewed", |_| Ok(LightbulbEvent::Unscrewed)),
            VariantSpec::new("SwitchedOn", |_| Ok(LightbulbEvent::SwitchedOn)),
            VariantSpec::new("SwitchedOff", |_| Ok(LightbulbEvent::SwitchedOff)),
        ]
    }

    fn data_type(&self) -> &'static str {
        match self {
            LightbulbEvent::Created { .. } => "Created",
            LightbulbEvent::ScrewedIn { .. } => "ScrewedIn",
            LightbulbEvent::Unscrewed => "Unscrewed",
            LightbulbEvent::SwitchedOn => "SwitchedOn",
            LightbulbEvent::SwitchedOff => "SwitchedOff",
        }
    }

    fn write_fields(&self, tuple: &mut TupleWriter) -> Result<()> {
        match self {
            LightbulbEvent::Created { wattage } => {
                tuple.put("wattage", wattage)?;
            }
            LightbulbEvent::ScrewedIn { location } => {
                tuple.put("location", location)?;
            }
            LightbulbEvent::Unscrewed | LightbulbEvent::SwitchedOn | LightbulbEvent::SwitchedOff => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::{Registry, VersionedName};
    use chrono::Utc;

    #[test]
    fn test_registry_metadata() {
        let registry = Registry::<LightbulbEvent>::build().unwrap();
        assert_eq!(registry.aggregate_type(), "lightbulb");

        let created = registry
            .descriptor_for_name(&VersionedName::of("created", "0"))
            .unwrap();
        assert!(created.characteristics().is_initial);
        assert_eq!(created.schema.to_string(), "lightbulb:created_0{wattage:Integer}");
    }

    #[test]
    fn test_screwed_in_round_trip() {
        let registry = Registry::<LightbulbEvent>::build().unwrap();
        let event = LightbulbEvent::ScrewedIn {
            location: "kitchen".to_string(),
        };

        let generic = registry.encode(&event, "bulb-1", Utc::now()).unwrap();
        assert_eq!(generic.tuple.get::<String>("location").unwrap(), "kitchen");
        assert_eq!(registry.decode(&generic).unwrap().data, event);
    }
}
