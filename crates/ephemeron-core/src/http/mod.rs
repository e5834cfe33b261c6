//! HTTP surface (axum).
//!
//! - public: webhook（`hook_router`）
//! - internal: probes と metrics（`probe_router`）

pub mod hooks;
pub mod probes;

pub use self::hooks::{HOOK_PATH, HookState, hook_router};
pub use self::probes::probe_router;
