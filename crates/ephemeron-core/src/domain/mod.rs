//! Domain model (reference, TTL, records, reports, errors, events).
//!
//! I/O を持たない純粋な型と関数だけを置く。

pub mod errors;
pub mod events;
pub mod record;
pub mod reference;
pub mod report;
pub mod ttl;

pub use self::errors::{
    DeleteError, ReapError, ReconcileError, ReferenceError, RegistryError, StoreError,
};
pub use self::events::{EventEnvelope, EventTarget, PUSH_ACTION, RegistryEvent};
pub use self::record::TrackingRecord;
pub use self::reference::ArtifactRef;
pub use self::report::{ReapReport, ReconcileReport};
pub use self::ttl::{TtlPolicy, clamp_ttl, parse_ttl};
