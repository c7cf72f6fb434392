//! 結合テスト用の台本どおりに動く送信モック
#![allow(dead_code)]

use colony_counter::transport::{BytesSent, ProgressSender, Transport, TransportError, TransportResponse};
use colony_counter_common::{AnalysisLedger, MemoryStore, UploadRequest};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Step {
    Progress { sent: u64, total: u64 },
    Sleep(Duration),
    Respond(TransportResponse),
    Fail(String),
    /// 応答しない
    Hang,
}

/// 呼ばれるたびに同じ台本を最初から実行する
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Vec<Step>>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Arc<UploadRequest>>>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Arc::new(steps),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Arc<UploadRequest>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: Arc<UploadRequest>,
        progress: ProgressSender,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send + 'static {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let script = Arc::clone(&self.script);

        async move {
            for step in script.iter() {
                match step {
                    Step::Progress { sent, total } => {
                        let _ = progress.send(BytesSent { sent: *sent, total: *total });
                    }
                    Step::Sleep(duration) => tokio::time::sleep(*duration).await,
                    Step::Respond(response) => return Ok(response.clone()),
                    Step::Fail(message) => return Err(TransportError::Network(message.clone())),
                    Step::Hang => std::future::pending::<()>().await,
                }
            }
            Err(TransportError::Network("script exhausted".to_string()))
        }
    }
}

pub fn ok_response(headers: &[(&str, &str)], body: &[u8]) -> TransportResponse {
    TransportResponse {
        status: 200,
        status_text: "OK".to_string(),
        headers: headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        body: body.to_vec(),
    }
}

pub fn error_response(status: u16, status_text: &str, body: &[u8]) -> TransportResponse {
    TransportResponse {
        status,
        status_text: status_text.to_string(),
        headers: Vec::new(),
        body: body.to_vec(),
    }
}

pub fn memory_ledger() -> AnalysisLedger<MemoryStore> {
    AnalysisLedger::load(MemoryStore::new())
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
