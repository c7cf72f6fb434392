//! reqwestによるmultipart送信
//!
//! フォーム: `file`（画像）, `nome_amostra`（検体名）, 任意で `x`/`y`/`r`（プレート位置）

use super::{BytesSent, ProgressSender, Transport, TransportError, TransportResponse};
use crate::config::Config;
use crate::error::{CounterError, Result};
use colony_counter_common::UploadRequest;
use futures::stream::{self, StreamExt};
use reqwest::multipart::{Form, Part};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// 進捗通知の粒度
const CHUNK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| CounterError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.endpoint_url(), config.connect_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: Arc<UploadRequest>,
        progress: ProgressSender,
    ) -> impl Future<Output = std::result::Result<TransportResponse, TransportError>> + Send + 'static
    {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();

        async move {
            let form = build_form(&request, progress)?;
            let response = client
                .post(&endpoint)
                .multipart(form)
                .send()
                .await
                .map_err(describe_error)?;

            let status = response.status();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response.bytes().await.map_err(describe_error)?.to_vec();

            Ok(TransportResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                headers,
                body,
            })
        }
    }
}

fn build_form(
    request: &UploadRequest,
    progress: ProgressSender,
) -> std::result::Result<Form, TransportError> {
    let total = request.file_bytes().len() as u64;
    let chunks: Vec<Vec<u8>> = request
        .file_bytes()
        .chunks(CHUNK_SIZE)
        .map(<[u8]>::to_vec)
        .collect();

    // hyperがチャンクを取り出した時点で送信済みとみなす
    let mut sent = 0u64;
    let body_stream = stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        let _ = progress.send(BytesSent { sent, total });
        Ok::<_, std::io::Error>(chunk)
    });

    let part = Part::stream_with_length(reqwest::Body::wrap_stream(body_stream), total)
        .file_name(request.file_name().to_string())
        .mime_str(mime_for(request.file_name()))
        .map_err(describe_error)?;

    let mut form = Form::new()
        .part("file", part)
        .text("nome_amostra", request.sample_name().to_string());
    for (name, value) in request.plate().form_fields() {
        form = form.text(name, value);
    }
    Ok(form)
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

fn describe_error(err: reqwest::Error) -> TransportError {
    let message = if err.is_connect() {
        format!("サーバーに接続できません: {}", err)
    } else if err.is_timeout() {
        format!("接続がタイムアウトしました: {}", err)
    } else {
        format!("通信エラー: {}", err)
    };
    TransportError::Network(message)
}
