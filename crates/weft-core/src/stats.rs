use serde::{Deserialize, Serialize};

use crate::pool::PoolStats;

/// Dispatcher の状態スナップショット（ログ・CLI 出力用）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub thread_name: String,
    pub alive: bool,
    pub terminated: bool,
    /// 投入済みで、まだ正常に実行されていない task 数
    pub outstanding: usize,
    /// ReadyQueue に残っている task 数
    pub queued: usize,
    pub executed: u64,
    pub failed: u64,
    pub panicked: u64,
    /// halt で破棄された task 数
    pub discarded: u64,
    pub pool: PoolStats,
}
