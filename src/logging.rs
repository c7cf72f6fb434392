//! ログ初期化
//!
//! 標準エラーへ出力する（標準出力は進捗バーと結果表示に使う）。
//! `RUST_LOG` が設定されていれば設定ファイルのレベルより優先する。

use crate::error::{CounterError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(level: &str, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| CounterError::Logging(e.to_string()))
}
