pub mod financial_policy;
pub mod layer;
pub mod refresh_gate;
pub mod singleflight;

pub use financial_policy::*;
pub use layer::*;
pub use refresh_gate::{RefreshGate, RefreshOutcome};
pub use singleflight::SingleflightCache;
