use super::error::Result;
use super::tuple::{Slot, SlotType, Tuple, TupleWriter};

// ============================================================================
// Variant Registration
// ============================================================================
//
// Each event hierarchy is a Rust enum. It describes its variants once, through
// `EventHierarchy::variants()`, and encodes itself through an exhaustive match
// in `write_fields`. Nothing is discovered at runtime.
//
// ============================================================================

/// Causal rank of a variant. Independent of timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    Initial,
    Terminal,
    Explicit(i32),
    Default,
}

impl Rank {
    pub const INITIAL: i32 = i32::MIN;
    pub const TERMINAL: i32 = i32::MAX;
    pub const PRETERMINAL: i32 = i32::MAX - 1;

    pub fn value(self) -> i32 {
        match self {
            Rank::Initial => Self::INITIAL,
            Rank::Terminal => Self::TERMINAL,
            Rank::Explicit(order) => order,
            Rank::Default => Self::PRETERMINAL,
        }
    }
}

/// Generic, reusable description of an event hierarchy.
///
/// `HIERARCHY_NAME` is the enum's own name; the aggregate type is derived from
/// it unless `AGGREGATE_TYPE` overrides it.
pub trait EventHierarchy: Sized + Send + Sync + 'static {
    const HIERARCHY_NAME: &'static str;
    const AGGREGATE_TYPE: Option<&'static str> = None;

    /// One registration per variant
    fn variants() -> Vec<VariantSpec<Self>>;

    /// The variant identifier, matching `VariantSpec::data_type`
    fn data_type(&self) -> &'static str;

    /// Write every field of this instance into the tuple
    fn write_fields(&self, tuple: &mut TupleWriter) -> Result<()>;
}

pub type DecodeFn<E> = fn(&Tuple) -> Result<E>;

/// Registration of one variant: identity, metadata markers, field list and
/// the constructor used on decode.
pub struct VariantSpec<E> {
    pub(crate) data_type: &'static str,
    pub(crate) name: Option<&'static str>,
    pub(crate) version: &'static str,
    pub(crate) rank: Rank,
    pub(crate) fields: Vec<Slot>,
    pub(crate) decode: DecodeFn<E>,
}

impl<E> VariantSpec<E> {
    /// `decode` reads fields by name in the constructor's own order
    pub fn new(data_type: &'static str, decode: DecodeFn<E>) -> Self {
        Self {
            data_type,
            name: None,
            version: "0",
            rank: Rank::Default,
            fields: Vec::new(),
            decode,
        }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    pub fn initial(mut self) -> Self {
        self.rank = Rank::Initial;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.rank = Rank::Terminal;
        self
    }

    pub fn ordered(mut self, order: i32) -> Self {
        self.rank = Rank::Explicit(order);
        self
    }

    pub fn field(mut self, name: &'static str, slot_type: SlotType) -> Self {
        self.fields.push(Slot::of(name, slot_type));
        self
    }

    pub fn event_name(&self) -> String {
        self.name
            .map(str::to_string)
            .unwrap_or_else(|| decapitalize(self.data_type))
    }
}

pub(crate) fn decapitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `LightbulbEvent` -> `lightbulb`, `ParcelEvents` -> `parcel`
pub fn derive_aggregate_type(hierarchy_name: &str) -> String {
    let stripped = hierarchy_name
        .strip_suffix("Events")
        .or_else(|| hierarchy_name.strip_suffix("Event"))
        .filter(|s| !s.is_empty())
        .unwrap_or(hierarchy_name);
    decapitalize(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_values() {
        assert_eq!(Rank::Initial.value(), i32::MIN);
        assert_eq!(Rank::Terminal.value(), i32::MAX);
        assert_eq!(Rank::Default.value(), i32::MAX - 1);
        assert_eq!(Rank::Explicit(3).value(), 3);
        assert!(Rank::Explicit(1000).value() < Rank::Default.value());
    }

    #[test]
    fn test_aggregate_type_derivation() {
        assert_eq!(derive_aggregate_type("LightbulbEvent"), "lightbulb");
        assert_eq!(derive_aggregate_type("ParcelEvents"), "parcel");
        assert_eq!(derive_aggregate_type("Ticket"), "ticket");
        assert_eq!(derive_aggregate_type("Event"), "event");
    }

    #[test]
    fn test_default_event_name_and_version() {
        let spec: VariantSpec<()> = VariantSpec::new("SwitchedOn", |_| Ok(()));
        assert_eq!(spec.event_name(), "switchedOn");
        assert_eq!(spec.version, "0");
        assert_eq!(spec.rank, Rank::Default);

        let spec = spec.named("on").version("2").terminal();
        assert_eq!(spec.event_name(), "on");
        assert_eq!(spec.version, "2");
        assert_eq!(spec.rank, Rank::Terminal);
    }
}
