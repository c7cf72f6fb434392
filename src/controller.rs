//! 送信の統括
//!
//! (ファイル, 検体名) を受け取りセッションを開始し、進捗を呼び出し元へ流す。
//! 成功時はメトリクスを解析履歴へ追記し、注釈付き画像を保持する。
//!
//! 同時に動くセッションは1つだけ。新しい送信や `reset` で前のセッションを
//! 受信側ごと破棄するため、古いセッションのイベントは届かない。

use crate::clock::{self, Clock, SystemClock};
use crate::error::{CounterError, Result};
use crate::session::{SessionEvent, SessionEvents, SessionId, SessionOptions, SessionState, UploadSession};
use crate::transport::Transport;
use colony_counter_common::types::{ERROR_MARKER_KEY, ERROR_MARKER_VALUE};
use colony_counter_common::{
    AnalysisLedger, KeyValueStore, LedgerEntry, MetricMap, PlateHint, ProgressEvent, UploadOutcome,
    UploadRequest,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 送信受付の控え
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionHandle {
    pub session_id: SessionId,
    pub file_name: String,
    pub sample_name: String,
}

/// 注釈付き結果画像
#[derive(Debug, Clone)]
pub struct ResultImage {
    file_name: String,
    bytes: Arc<[u8]>,
}

impl ResultImage {
    fn new(file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// ダウンロード時のファイル名
    pub fn download_name(&self) -> String {
        format!("resultado_{}", self.file_name)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Timeout,
    Server { status_code: u16 },
    Cancelled,
}

/// 利用者に見せる失敗内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SubmissionFailure {
    fn from_outcome(outcome: &UploadOutcome) -> Option<Self> {
        let (kind, message) = match outcome {
            UploadOutcome::Success { .. } => return None,
            UploadOutcome::ServerError { status_code, message } => {
                (FailureKind::Server { status_code: *status_code }, message.clone())
            }
            UploadOutcome::NetworkError { message } => (FailureKind::Network, message.clone()),
            UploadOutcome::Timeout => (
                FailureKind::Timeout,
                "サーバーの応答がタイムアウトしました。時間をおいて再試行してください".to_string(),
            ),
            UploadOutcome::Cancelled => (FailureKind::Cancelled, "送信をキャンセルしました".to_string()),
        };
        Some(Self { kind, message })
    }
}

/// 1回の送信の最終結果
///
/// 失敗時の `summary` は `{ERRO: "..."}` のみで、表示側はこれを見て
/// メトリクス表示を抑止できる。
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub session_id: SessionId,
    pub file_name: String,
    pub sample_name: String,
    pub summary: MetricMap,
    pub feedback: MetricMap,
    pub image: Option<ResultImage>,
    pub failure: Option<SubmissionFailure>,
    /// 追記された履歴の位置
    pub ledger_index: Option<usize>,
    /// 履歴の保存に失敗した場合のメッセージ（履歴自体はメモリ上に残る）
    pub persistence_error: Option<String>,
}

impl AnalysisReport {
    fn new(session_id: SessionId, request: &UploadRequest) -> Self {
        Self {
            session_id,
            file_name: request.file_name().to_string(),
            sample_name: request.sample_name().to_string(),
            summary: MetricMap::new(),
            feedback: MetricMap::new(),
            image: None,
            failure: None,
            ledger_index: None,
            persistence_error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn is_error_marked(&self) -> bool {
        self.summary.contains_key(ERROR_MARKER_KEY)
    }

    pub fn user_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    Progress { session_id: SessionId, event: ProgressEvent },
    Finished(AnalysisReport),
}

struct ActiveSubmission {
    session: UploadSession,
    events: SessionEvents,
}

pub struct UploadController<T: Transport, S: KeyValueStore, C: Clock = SystemClock> {
    transport: Arc<T>,
    ledger: AnalysisLedger<S>,
    clock: C,
    options: SessionOptions,
    active: Option<ActiveSubmission>,
    current: Option<ResultImage>,
}

impl<T: Transport, S: KeyValueStore> UploadController<T, S, SystemClock> {
    pub fn new(transport: T, ledger: AnalysisLedger<S>, options: SessionOptions) -> Self {
        Self::with_clock(transport, ledger, options, SystemClock)
    }
}

impl<T: Transport, S: KeyValueStore, C: Clock> UploadController<T, S, C> {
    pub fn with_clock(transport: T, ledger: AnalysisLedger<S>, options: SessionOptions, clock: C) -> Self {
        Self {
            transport: Arc::new(transport),
            ledger,
            clock,
            options,
            active: None,
            current: None,
        }
    }

    pub fn ledger(&self) -> &AnalysisLedger<S> {
        &self.ledger
    }

    /// 選択・削除・エクスポートなど画面操作用
    pub fn ledger_mut(&mut self) -> &mut AnalysisLedger<S> {
        &mut self.ledger
    }

    pub fn current_image(&self) -> Option<&ResultImage> {
        self.current.as_ref()
    }

    /// 進行中のセッションの状態
    pub fn active_state(&self) -> Option<SessionState> {
        self.active.as_ref().map(|a| a.session.state())
    }

    /// 未完了のセッションがあるか（cancel直後からfalse）
    pub fn is_busy(&self) -> bool {
        self.active_state().is_some_and(|state| !state.is_terminal())
    }

    /// 送信を開始する
    ///
    /// 空ファイルは通信前に `CounterError::Validation` で拒否する。
    /// 進行中のセッションがあればキャンセルして破棄する。
    pub fn submit(&mut self, file_bytes: Vec<u8>, file_name: &str, sample_name: Option<&str>) -> Result<SubmissionHandle> {
        self.submit_with_plate(file_bytes, file_name, sample_name, PlateHint::default())
    }

    pub fn submit_with_plate(
        &mut self,
        file_bytes: Vec<u8>,
        file_name: &str,
        sample_name: Option<&str>,
        plate: PlateHint,
    ) -> Result<SubmissionHandle> {
        if file_bytes.is_empty() {
            return Err(CounterError::Validation(format!("ファイルが空です: {}", file_name)));
        }

        self.abort_active();
        self.release_current();

        let request = UploadRequest::new(file_bytes, file_name, sample_name).with_plate(plate);
        let (session, events) = UploadSession::start(Arc::clone(&self.transport), request, self.options);

        let handle = SubmissionHandle {
            session_id: session.id(),
            file_name: session.request().file_name().to_string(),
            sample_name: session.request().sample_name().to_string(),
        };
        self.active = Some(ActiveSubmission { session, events });
        Ok(handle)
    }

    /// 次のイベントを待つ（進行中のセッションがなければNone）
    ///
    /// 終端イベントを受け取った時点で履歴への追記まで済ませて返す。
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        let active = self.active.as_mut()?;
        let session_id = active.session.id();
        let request = active.session.request_handle();

        let event = active.events.next().await;

        match event {
            Some(SessionEvent::Progress(event)) => Some(ControllerEvent::Progress { session_id, event }),
            Some(SessionEvent::Finished(outcome)) => {
                self.active = None;
                Some(ControllerEvent::Finished(self.complete(session_id, &request, outcome)))
            }
            None => {
                self.active = None;
                None
            }
        }
    }

    /// 終端まで待ち、途中の進捗はコールバックへ渡す
    pub async fn wait_for_report<F>(&mut self, mut on_progress: F) -> Option<AnalysisReport>
    where
        F: FnMut(&ProgressEvent),
    {
        while let Some(event) = self.next_event().await {
            match event {
                ControllerEvent::Progress { event, .. } => on_progress(&event),
                ControllerEvent::Finished(report) => return Some(report),
            }
        }
        None
    }

    /// 進行中のセッションをキャンセルする（なければ何もしない）
    ///
    /// `Cancelled` の結果は次の `next_event` で届く。
    pub fn cancel(&mut self) -> bool {
        self.active.as_ref().is_some_and(|active| active.session.cancel())
    }

    /// 表示中の結果を破棄し、進行中のセッションも中断する
    pub fn reset(&mut self) {
        self.abort_active();
        self.release_current();
    }

    /// 進行中のセッションを破棄する
    ///
    /// 終端済みで結果が未読の場合は、その結果を履歴に反映してから破棄する。
    fn abort_active(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        let session_id = active.session.id();

        if active.session.cancel() {
            info!(session = session_id, "superseded session cancelled");
            return;
        }

        let request = active.session.request_handle();
        while let Some(event) = active.events.try_next() {
            if let SessionEvent::Finished(outcome) = event {
                let report = self.complete(session_id, &request, outcome);
                info!(
                    session = session_id,
                    ledger_index = ?report.ledger_index,
                    "unread result recorded before discarding session"
                );
            }
        }
    }

    fn release_current(&mut self) {
        if let Some(image) = self.current.take() {
            debug!(bytes = image.len(), "released result image");
        }
    }

    fn complete(&mut self, session_id: SessionId, request: &UploadRequest, outcome: UploadOutcome) -> AnalysisReport {
        let mut report = AnalysisReport::new(session_id, request);

        if let Some(failure) = SubmissionFailure::from_outcome(&outcome) {
            warn!(session = report.session_id, kind = ?failure.kind, "analysis failed: {}", failure.message);
            report
                .summary
                .insert(ERROR_MARKER_KEY.to_string(), ERROR_MARKER_VALUE.to_string());
            report.failure = Some(failure);
            return report;
        }

        if let UploadOutcome::Success { result_image, summary, feedback } = outcome {
            let (date_iso, time_iso) = clock::stamp(&self.clock);
            let entry = LedgerEntry {
                sample_name: request.sample_name().to_string(),
                date_iso,
                time_iso,
                summary: summary.clone(),
                feedback: feedback.clone(),
            };

            match self.ledger.append(entry) {
                Ok(index) => {
                    info!(session = report.session_id, index, "ledger entry appended");
                    report.ledger_index = Some(index);
                }
                Err(e) => {
                    warn!(session = report.session_id, "ledger persistence failed: {}", e);
                    report.ledger_index = self.ledger.len().checked_sub(1);
                    report.persistence_error = Some(e.to_string());
                }
            }

            let image = ResultImage::new(request.file_name(), result_image);
            self.current = Some(image.clone());
            report.image = Some(image);
            report.summary = summary;
            report.feedback = feedback;
        }

        report
    }
}
