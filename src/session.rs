//! 送信セッション
//!
//! 1つの `UploadRequest` について1回の送受信を行い、進捗通知と
//! ちょうど1つの終端結果（`UploadOutcome`）を届ける。
//!
//! 状態遷移:
//! `Idle → Sending → AwaitingServer → {Succeeded | Failed | TimedOut | Cancelled}`
//!
//! 終端状態への遷移は `Shared::finish` だけが行い、同じロックの中で
//! イベントを送るため、終端後に進捗が届くことはない。

use crate::transport::{BytesSent, Transport, TransportError, TransportResponse};
use colony_counter_common::{
    parse_response_metrics, Phase, ProgressEvent, ResponseMetrics, UploadOutcome, UploadRequest,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// 既定の応答待ち上限
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sending,
    AwaitingServer,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::TimedOut | SessionState::Cancelled
        )
    }

    fn for_outcome(outcome: &UploadOutcome) -> Self {
        match outcome {
            UploadOutcome::Success { .. } => SessionState::Succeeded,
            UploadOutcome::ServerError { .. } | UploadOutcome::NetworkError { .. } => SessionState::Failed,
            UploadOutcome::Timeout => SessionState::TimedOut,
            UploadOutcome::Cancelled => SessionState::Cancelled,
        }
    }
}

/// セッションから届くイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Progress(ProgressEvent),
    Finished(UploadOutcome),
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT }
    }
}

/// セッションのイベント受信側
#[derive(Debug)]
pub struct SessionEvents {
    session_id: SessionId,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionEvents {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// 次のイベントを待つ（キャンセル安全）
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// 届いているイベントがあれば返す
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug)]
struct Shared {
    id: SessionId,
    state: Mutex<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> bool {
        let mut state = self.lock();
        if *state != SessionState::Idle {
            return false;
        }
        *state = SessionState::Sending;
        true
    }

    fn emit_progress(&self, event: ProgressEvent) {
        let mut state = self.lock();
        if state.is_terminal() {
            return;
        }
        if event.phase == Phase::AwaitingServer && *state == SessionState::Sending {
            *state = SessionState::AwaitingServer;
            debug!(session = self.id, "upload complete, awaiting server");
        }
        let _ = self.events.send(SessionEvent::Progress(event));
    }

    /// 終端結果を確定する（2回目以降はfalse）
    fn finish(&self, outcome: UploadOutcome) -> bool {
        let mut state = self.lock();
        if state.is_terminal() {
            return false;
        }
        *state = SessionState::for_outcome(&outcome);
        info!(session = self.id, outcome = outcome.label(), "session finished");
        let _ = self.events.send(SessionEvent::Finished(outcome));
        true
    }
}

/// 送信セッション
///
/// dropされると未完了の送信はキャンセルされる。
#[derive(Debug)]
pub struct UploadSession {
    shared: Arc<Shared>,
    request: Arc<UploadRequest>,
    task: Option<JoinHandle<()>>,
}

impl UploadSession {
    /// 送信を開始する（tokioランタイム内で呼ぶこと）
    pub fn start<T: Transport>(
        transport: Arc<T>,
        request: UploadRequest,
        options: SessionOptions,
    ) -> (Self, SessionEvents) {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            id,
            state: Mutex::new(SessionState::Idle),
            events: tx,
        });
        let request = Arc::new(request);

        let mut session = Self {
            shared: Arc::clone(&shared),
            request: Arc::clone(&request),
            task: None,
        };

        if shared.begin() {
            info!(
                session = id,
                file = request.file_name(),
                sample = request.sample_name(),
                bytes = request.file_bytes().len(),
                "session started"
            );
            session.task = Some(tokio::spawn(drive(shared, transport, request, options.timeout)));
        }

        (session, SessionEvents { session_id: id, rx })
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        *self.shared.lock()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn request(&self) -> &UploadRequest {
        &self.request
    }

    pub(crate) fn request_handle(&self) -> Arc<UploadRequest> {
        Arc::clone(&self.request)
    }

    /// キャンセル（終端済みなら何もしない）
    ///
    /// 呼び出した時点で `Cancelled` が確定し、転送は中断される。
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.finish(UploadOutcome::Cancelled);
        if cancelled {
            if let Some(task) = &self.task {
                task.abort();
            }
        }
        cancelled
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn drive<T: Transport>(
    shared: Arc<Shared>,
    transport: Arc<T>,
    request: Arc<UploadRequest>,
    timeout: Duration,
) {
    let (byte_tx, mut byte_rx) = mpsc::unbounded_channel();
    let exchange = transport.send(request, byte_tx);
    tokio::pin!(exchange);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut tracker = ProgressTracker::default();

    let outcome = loop {
        tokio::select! {
            biased;
            Some(bytes) = byte_rx.recv() => {
                if let Some(event) = tracker.advance(bytes) {
                    shared.emit_progress(event);
                }
            }
            result = &mut exchange => {
                // 終端より前に残りの進捗を流す
                while let Ok(bytes) = byte_rx.try_recv() {
                    if let Some(event) = tracker.advance(bytes) {
                        shared.emit_progress(event);
                    }
                }
                break classify(result);
            }
            () = &mut deadline => break UploadOutcome::Timeout,
        }
    };

    shared.finish(outcome);
}

/// バイト数を単調非減少のパーセントに変換する
#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    last: Option<u8>,
}

impl ProgressTracker {
    pub(crate) fn advance(&mut self, bytes: BytesSent) -> Option<ProgressEvent> {
        let percent = percent_of(bytes);
        if self.last.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last = Some(percent);
        let phase = if percent >= 100 { Phase::AwaitingServer } else { Phase::Uploading };
        Some(ProgressEvent { percent, phase })
    }
}

fn percent_of(bytes: BytesSent) -> u8 {
    if bytes.total == 0 {
        return 100;
    }
    let sent = bytes.sent.min(bytes.total) as u128;
    (sent * 100 / bytes.total as u128) as u8
}

fn classify(result: Result<TransportResponse, TransportError>) -> UploadOutcome {
    match result {
        Ok(response) => classify_response(response),
        Err(TransportError::Network(message)) => UploadOutcome::NetworkError { message },
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

/// HTTP応答を終端結果に分類する
///
/// 2xx以外は本文のJSON `{"detail": "..."}` をメッセージにし、
/// 読めなければ `"<status> <reason>"` にする。
pub fn classify_response(response: TransportResponse) -> UploadOutcome {
    if (200..300).contains(&response.status) {
        let ResponseMetrics { summary, feedback } = parse_response_metrics(
            response.headers.iter().map(|(name, value)| (name.as_str(), value.as_str())),
        );
        return UploadOutcome::Success {
            result_image: response.body,
            summary,
            feedback,
        };
    }

    let message = serde_json::from_slice::<ErrorBody>(&response.body)
        .map(|body| body.detail)
        .unwrap_or_else(|_| {
            format!("{} {}", response.status, response.status_text)
                .trim_end()
                .to_string()
        });

    UploadOutcome::ServerError {
        status_code: response.status,
        message,
    }
}
