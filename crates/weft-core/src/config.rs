//! DispatcherConfig - Dispatcher の構築パラメータ
//!
//! # 学習ポイント
//! - `#[serde(default)]` で部分的な JSON から設定を読み込む
//! - 起動時検証（Fail-fast 設計）

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};

pub const DEFAULT_NAME: &str = "weft";
pub const DEFAULT_BACKLOG: usize = 2048;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 200;
pub const DEFAULT_MAX_IDLE_MS: u64 = 200;

/// Dispatcher の設定
///
/// # フィールド
/// - `name`: worker thread 名の接頭辞（動作には影響しない）
/// - `backlog`: TaskPool が再利用のために保持する idle task の上限
/// - `poll_timeout_ms`: worker が Ready Queue を待つ最大時間
/// - `max_idle_ms`: この時間以上 idle だった pooled task は再利用せず捨てる（0 で無効）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub name: String,
    pub backlog: usize,
    pub poll_timeout_ms: u64,
    pub max_idle_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            backlog: DEFAULT_BACKLOG,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            max_idle_ms: DEFAULT_MAX_IDLE_MS,
        }
    }
}

impl DispatcherConfig {
    pub fn new(name: impl Into<String>, backlog: usize) -> Self {
        Self {
            name: name.into(),
            backlog,
            ..Self::default()
        }
    }

    /// ms 単位に切り捨てる（1ms 未満は 0 になり validate で弾かれる）
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// ms 単位に切り捨てる（1ms 未満は 0 = 期限なし）
    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle_ms = duration_to_ms(max_idle);
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_millis(self.max_idle_ms)
    }

    /// JSON ファイルから読み込んで検証する
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::config("name must not be empty"));
        }
        if self.backlog == 0 {
            return Err(DispatchError::config("backlog must be greater than 0"));
        }
        if self.poll_timeout_ms == 0 {
            return Err(DispatchError::config(
                "poll_timeout_ms must be at least 1 (millisecond granularity)",
            ));
        }
        Ok(())
    }
}

fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
