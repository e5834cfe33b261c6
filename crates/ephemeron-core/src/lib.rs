//! ephemeron-core
//!
//! Expiry tracking and reclamation for registry images tagged with a lifetime.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（reference, ttl, record, report, events, errors）
//! - **ports**: 抽象化レイヤー（TrackingStore, ArtifactDeleter, ArtifactCatalog, Clock）
//! - **impls**: 実装（Redis / InMemory の追跡 store、registry クライアント）
//! - **app**: アプリケーションロジック（Ingestor, Reaper, Reconciler）
//! - **http**: webhook と probe の axum router
//! - **config**, **metrics**: 設定と Prometheus

pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod impls;
pub mod metrics;
pub mod ports;
