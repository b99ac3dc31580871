pub mod parser;
pub mod scope;
pub mod spec;
pub mod tables;

pub use parser::{coerce_json, parse_int_clamped, parse_slot};
pub use scope::is_out_of_scope;
pub use spec::{
    Filled, IntBounds, ParserHint, ResolvedSlot, SlotSpec, SlotType, SlotValue, UiHints,
};
