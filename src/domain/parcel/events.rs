use crate::event_sourcing::core::{
    EventHierarchy, Result, SlotType, Tuple, TupleWriter, VariantSpec,
};

// ============================================================================
// Parcel Events
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ParcelEvent {
    ReceivedAtDepot { depot_id: String },
    LoadedOntoTruck { truck_id: String },
    Delivered { destination_id: String },
    DeliveryFailed,
}

impl EventHierarchy for ParcelEvent {
    const HIERARCHY_NAME: &'static str = "ParcelEvent";

    fn variants() -> Vec<VariantSpec<Self>> {
        vec![
            VariantSpec::new("ReceivedAtDepot", |t: &Tuple| {
                Ok(ParcelEvent::ReceivedAtDepot {
                    depot_id: t.get("depotId")?,
                })
            })
            .field("depotId", SlotType::String),
            VariantSpec::new("LoadedOntoTruck", |t: &Tuple| {
                Ok(ParcelEvent::LoadedOntoTruck {
                    truck_id: t.get("truckId")?,
                })
            })
            .field("truckId", SlotType::String),
            VariantSpec::new("Delivered", |t: &Tuple| {
                Ok(ParcelEvent::Delivered {
                    destination_id: t.get("destinationId")?,
                })
            })
            .terminal()
            .field("destinationId", SlotType::String),
            VariantSpec::new("DeliveryFailed", |_| Ok(ParcelEvent::DeliveryFailed)),
        ]
    }

    fn data_type(&self) -> &'static str {
        match self {
            ParcelEvent::ReceivedAtDepot { .. } => "ReceivedAtDepot",
            ParcelEvent::LoadedOntoTruck { .. } => "LoadedOntoTruck",
            ParcelEvent::Delivered { .. } => "Delivered",
            ParcelEvent::DeliveryFailed => "DeliveryFailed",
        }
    }

    fn write_fields(&self, tuple: &mut TupleWriter) -> Result<()> {
        match self {
            ParcelEvent::ReceivedAtDepot { depot_id } => {
                tuple.put("depotId", depot_id)?;
            }
            ParcelEvent::LoadedOntoTruck { truck_id } => {
                tuple.put("truckId", truck_id)?;
            }
            ParcelEvent::Delivered { destination_id } => {
                tuple.put("destinationId", destination_id)?;
            }
            ParcelEvent::DeliveryFailed => {}
        }
        Ok(())
    }
}

/// One-line description of a parcel event, for logs and demos
pub fn describe_event(event: &ParcelEvent) -> String {
    match event {
        ParcelEvent::ReceivedAtDepot { depot_id } => format!("Received at depot: {}", depot_id),
        ParcelEvent::LoadedOntoTruck { truck_id } => format!("Loaded onto truck: {}", truck_id),
        ParcelEvent::Delivered { destination_id } => format!("Delivered to: {}", destination_id),
        ParcelEvent::DeliveryFailed => "Delivery failed".to_string(),
    }
}
