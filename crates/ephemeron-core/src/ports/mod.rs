//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（Redis, OCI registry）へのインターフェースを提供し、
//! 実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - Redis（coordination store）が追跡状態の置き場
//! - registry のカタログが ground truth（追跡状態を失っても再構築できる）

pub mod artifact_store;
pub mod clock;
pub mod tracking_store;

pub use self::artifact_store::{ArtifactCatalog, ArtifactDeleter, DeleteOutcome};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::tracking_store::TrackingStore;
