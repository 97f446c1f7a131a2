//! ReadyQueue - 投入済み task を保持する blocking FIFO
//!
//! # 学習ポイント
//! - Mutex + Condvar による timeout 付き blocking poll
//! - 割り込み（interrupt）でブロック中の consumer を即座に起こす
//!
//! # 実装詳細
//! - `VecDeque<T>` を Mutex で保護
//! - enqueue 時と interrupt 時に Condvar で通知
//! - 容量は無制限（enqueue はブロックしない）

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// poll が割り込まれたことを表すマーカー
///
/// エラーではなく「終了シグナル」。一度 interrupt された queue は
/// 以降の poll で常にこれを返します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ready queue interrupted")
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    interrupted: bool,
}

pub struct ReadyQueue<T> {
    state: Mutex<QueueState<T>>,
    condvar: Condvar,
}

impl<T> ReadyQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                interrupted: false,
            }),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 末尾に追加して待機中の consumer に通知
    pub fn enqueue(&self, item: T) {
        let mut state = self.lock();
        state.items.push_back(item);
        drop(state);
        self.condvar.notify_one();
    }

    /// 先頭を取り出す。`timeout` 以内に何もなければ `Ok(None)`。
    ///
    /// interrupt 済みなら、残っている item があっても `Err(Interrupted)`。
    pub fn poll(&self, timeout: Duration) -> Result<Option<T>, Interrupted> {
        let start = Instant::now();
        let mut guard = self.lock();
        loop {
            if guard.interrupted {
                return Err(Interrupted);
            }
            if let Some(item) = guard.items.pop_front() {
                return Ok(Some(item));
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(None);
            }
            let remaining = timeout.saturating_sub(elapsed);
            let (new_guard, _) = self
                .condvar
                .wait_timeout(guard, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            guard = new_guard;
        }
    }

    /// 以降の poll をすべて `Interrupted` にし、ブロック中の poll を起こす
    pub fn interrupt(&self) {
        let mut state = self.lock();
        state.interrupted = true;
        drop(state);
        self.condvar.notify_all();
    }

    pub fn is_interrupted(&self) -> bool {
        self.lock().interrupted
    }

    /// 残っている item を順序どおりに全部取り出す
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

impl<T> Default for ReadyQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
