//! 解析リクエスト・結果の型定義
//!
//! CLIとライブラリで共有される型:
//! - UploadRequest: 送信する画像と検体名
//! - ProgressEvent / UploadOutcome: 1回の送信セッションの進捗と終端結果
//! - LedgerEntry: 解析履歴の1行

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ヘッダ由来のメトリクス（キー → 値）
pub type MetricMap = BTreeMap<String, String>;

/// 集計ヘッダの総数キー（`x-resumo-total`）
pub const SUMMARY_TOTAL_KEY: &str = "TOTAL";
/// 密度（UFC/cm2）のフィードバックキー
pub const FEEDBACK_DENSITY_KEY: &str = "densidadecoloniascm2";
/// プレート全体の推定コロニー数のフィードバックキー
pub const FEEDBACK_ESTIMATE_KEY: &str = "estimativatotalcolonias";
/// 失敗時に結果セットへ入れるマーカー
pub const ERROR_MARKER_KEY: &str = "ERRO";
pub const ERROR_MARKER_VALUE: &str = "Falha no processamento.";

/// プレート位置の手動指定（省略時はサーバー側で自動検出）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateHint {
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub r: Option<u32>,
}

impl PlateHint {
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.r.is_none()
    }

    /// multipartに追加するフォームフィールド
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        [("x", self.x), ("y", self.y), ("r", self.r)]
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v.to_string())))
            .collect()
    }
}

/// 送信リクエスト（生成後は不変）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    file_bytes: Vec<u8>,
    file_name: String,
    sample_name: String,
    plate: PlateHint,
}

impl UploadRequest {
    /// 検体名が未指定または空白のみの場合はファイル名を使う
    pub fn new(file_bytes: Vec<u8>, file_name: impl Into<String>, sample_name: Option<&str>) -> Self {
        let file_name = file_name.into();
        let sample_name = match sample_name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => file_name.clone(),
        };
        Self {
            file_bytes,
            file_name,
            sample_name,
            plate: PlateHint::default(),
        }
    }

    pub fn with_plate(mut self, plate: PlateHint) -> Self {
        self.plate = plate;
        self
    }

    pub fn file_bytes(&self) -> &[u8] {
        &self.file_bytes
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn sample_name(&self) -> &str {
        &self.sample_name
    }

    pub fn plate(&self) -> &PlateHint {
        &self.plate
    }
}

/// 送信フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// バイト転送中
    Uploading,
    /// 送信完了、サーバー処理待ち
    AwaitingServer,
}

/// 進捗通知（percentは0..=100、セッション内で単調非減少）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub percent: u8,
    pub phase: Phase,
}

/// 集計・フィードバックの2グループ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    pub summary: MetricMap,
    pub feedback: MetricMap,
}

/// 1セッションの終端結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success {
        result_image: Vec<u8>,
        summary: MetricMap,
        feedback: MetricMap,
    },
    ServerError {
        status_code: u16,
        message: String,
    },
    NetworkError {
        message: String,
    },
    Timeout,
    Cancelled,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }

    /// ログ出力用の短いラベル
    pub fn label(&self) -> &'static str {
        match self {
            UploadOutcome::Success { .. } => "success",
            UploadOutcome::ServerError { .. } => "server_error",
            UploadOutcome::NetworkError { .. } => "network_error",
            UploadOutcome::Timeout => "timeout",
            UploadOutcome::Cancelled => "cancelled",
        }
    }
}

/// 解析履歴の1行
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub sample_name: String,

    /// 解析日（YYYY-MM-DD）
    pub date_iso: String,

    /// 解析時刻（HH:MM:SS）
    pub time_iso: String,

    #[serde(default)]
    pub summary: MetricMap,

    #[serde(default)]
    pub feedback: MetricMap,
}

impl LedgerEntry {
    pub fn total(&self) -> Option<&str> {
        self.summary.get(SUMMARY_TOTAL_KEY).map(String::as_str)
    }

    pub fn density(&self) -> Option<&str> {
        self.feedback.get(FEEDBACK_DENSITY_KEY).map(String::as_str)
    }

    pub fn estimated_total(&self) -> Option<&str> {
        self.feedback.get(FEEDBACK_ESTIMATE_KEY).map(String::as_str)
    }
}
