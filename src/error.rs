use thiserror::Error;

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("入力エラー: {0}")]
    Validation(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("通信クライアント初期化エラー: {0}")]
    Transport(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("対話入力エラー: {0}")]
    Prompt(String),

    #[error("ログ初期化エラー: {0}")]
    Logging(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] colony_counter_common::Error),
}

pub type Result<T> = std::result::Result<T, CounterError>;
