//! App - アプリケーション層
//!
//! ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **Ingestor**: registry の push 通知 → 追跡レコード
//! - **Reaper / ReaperHandle**: 期限切れ artifact の回収（定期ループ）
//! - **Reconciler**: registry のカタログから追跡状態を再構築

pub mod ingest;
pub mod reaper_loop;
pub mod reconciler;

// 主要な型を再エクスポート
pub use self::ingest::{IngestSummary, Ingestor};
pub use self::reaper_loop::{Reaper, ReaperHandle, run_reaper};
pub use self::reconciler::Reconciler;
