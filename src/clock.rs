//! 解析履歴のタイムスタンプ用クロック

use chrono::NaiveDateTime;

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// ローカル時刻
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// 固定時刻（テスト・再現用）
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// (日付, 時刻) を `YYYY-MM-DD`, `HH:MM:SS` で返す
pub fn stamp(clock: &dyn Clock) -> (String, String) {
    let now = clock.now();
    (now.format("%Y-%m-%d").to_string(), now.format("%H:%M:%S").to_string())
}
