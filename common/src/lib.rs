//! Colony Counter Common Library
//!
//! 通信に依存しない型・メトリクスパーサー・解析履歴

pub mod types;
pub mod error;
pub mod metrics;
pub mod store;
pub mod ledger;
pub mod export;

pub use types::{
    LedgerEntry, MetricMap, Phase, PlateHint, ProgressEvent, ResponseMetrics, UploadOutcome,
    UploadRequest,
};
pub use error::{Error, Result};
pub use metrics::{normalize_feedback_key, parse_response_metrics};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use ledger::{AnalysisLedger, LoadStatus, LEDGER_KEY};
pub use export::{ExportColumn, EXPORT_COLUMNS};
