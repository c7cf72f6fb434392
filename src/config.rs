use crate::error::{CounterError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://bacteria-colony-counter-production.up.railway.app";
const DEFAULT_ENDPOINT_PATH: &str = "/contar/";
/// サーバー側の計数処理時間を下回らないこと
pub const MIN_TIMEOUT_SECONDS: u64 = 30;
const URL_ENV: &str = "COLONY_COUNTER_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub endpoint_path: String,
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    /// 解析履歴の保存先（省略時はOS標準のデータディレクトリ）
    pub data_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.into(),
            timeout_seconds: 60,
            connect_timeout_seconds: 10,
            data_dir: None,
            log_level: "info".into(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CounterError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("colony-counter").join("config.json"))
    }

    /// 送信先URL（環境変数を優先）
    pub fn endpoint_url(&self) -> String {
        let base = std::env::var(URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.base_url.clone());
        join_url(&base, &self.endpoint_path)
    }

    /// 応答待ちの上限（最低30秒）
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(MIN_TIMEOUT_SECONDS))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let base = dirs::data_dir()
            .ok_or_else(|| CounterError::Config("データディレクトリが見つかりません".into()))?;
        Ok(base.join("colony-counter"))
    }

    pub fn set_base_url(&mut self, url: String) -> Result<()> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CounterError::Config(format!("URLはhttp(s)で始まる必要があります: {}", url)));
        }
        self.base_url = url;
        self.save()
    }

    pub fn set_timeout_seconds(&mut self, seconds: u64) -> Result<()> {
        if seconds < MIN_TIMEOUT_SECONDS {
            return Err(CounterError::Config(format!(
                "タイムアウトは{}秒以上を指定してください",
                MIN_TIMEOUT_SECONDS
            )));
        }
        self.timeout_seconds = seconds;
        self.save()
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
