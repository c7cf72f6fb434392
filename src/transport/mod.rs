//! 解析サーバーへの送信
//!
//! `Transport::send` が返すFutureをdropすると転送は中断される（abort）。
//! 進捗は `ProgressSender` へ送信済みバイト数として通知する。

mod http;

pub use http::HttpTransport;

use colony_counter_common::UploadRequest;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// 送信済みバイト数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytesSent {
    pub sent: u64,
    pub total: u64,
}

pub type ProgressSender = mpsc::UnboundedSender<BytesSent>;

/// サーバー応答（本文は読み込み済み）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    /// 受信順のヘッダ（重複あり）
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// 応答が得られなかった失敗
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0}")]
    Network(String),
}

pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: Arc<UploadRequest>,
        progress: ProgressSender,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send + 'static;
}
