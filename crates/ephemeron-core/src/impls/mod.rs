//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **RedisTrackingStore**: 本番用の追跡 store
//! - **InMemoryTrackingStore**: 開発・テスト用の追跡 store
//! - **RegistryClient**: OCI distribution API クライアント（削除と列挙）
//! - **InMemoryRegistry**: テスト用の registry（失敗注入付き）

pub mod inmem_registry;
pub mod inmem_tracking;
pub mod redis_tracking;
pub mod registry;

// 主要な型を再エクスポート
pub use self::inmem_registry::InMemoryRegistry;
pub use self::inmem_tracking::InMemoryTrackingStore;
pub use self::redis_tracking::RedisTrackingStore;
pub use self::registry::RegistryClient;
