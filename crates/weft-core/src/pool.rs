//! TaskPool - 再利用可能なオブジェクトの bounded cache
//!
//! # 学習ポイント
//! - Free list（Vec を stack として使う）による再利用
//! - 「枯渇したら作る」フォールバック（allocate は決してブロックしない）
//! - Mutex poisoning からの回復（`PoisonError::into_inner`）
//!
//! # 契約
//! - `allocate()`: idle なものがあれば返し、なければ factory で新規作成
//! - `deallocate()`: free list が `capacity` 未満なら保持、満杯なら drop
//!
//! pool が制限するのは「再利用のために保持する数」であって、同時に
//! in-flight な数ではありません。

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Pool の累積カウンタ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// factory で新規作成した数
    pub created: u64,
    /// free list から再利用した数
    pub reused: u64,
    /// deallocate で free list に戻した数
    pub retained: u64,
    /// free list が満杯で捨てた数
    pub dropped: u64,
    /// idle 期間が長すぎて捨てた数
    pub expired: u64,
    /// 現在の idle 数
    pub idle: usize,
}

struct Idle<T> {
    item: T,
    released_at: Instant,
}

struct PoolState<T> {
    free: Vec<Idle<T>>,
    stats: PoolStats,
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

pub struct TaskPool<T> {
    state: Mutex<PoolState<T>>,
    factory: Factory<T>,
    capacity: usize,
    max_idle: Duration,
}

impl<T> TaskPool<T> {
    /// `max_idle` が `Duration::ZERO` なら idle 期限を設けない
    pub fn new<F>(capacity: usize, max_idle: Duration, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(PoolState {
                free: Vec::with_capacity(capacity),
                stats: PoolStats::default(),
            }),
            factory: Box::new(factory),
            capacity,
            max_idle,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stale(&self, released_at: Instant) -> bool {
        !self.max_idle.is_zero() && released_at.elapsed() >= self.max_idle
    }

    pub fn allocate(&self) -> T {
        {
            let mut state = self.lock();
            if let Some(entry) = state.free.pop() {
                if !self.is_stale(entry.released_at) {
                    state.stats.reused += 1;
                    return entry.item;
                }
                // LIFO なので下にあるものはもっと古い
                let expired = state.free.len() as u64 + 1;
                state.free.clear();
                state.stats.expired += expired;
            }
            state.stats.created += 1;
        }
        // factory はロックの外で呼ぶ
        (self.factory)()
    }

    /// 保持したら `true`、満杯で捨てたら `false`
    ///
    /// 満杯のときは先に期限切れの entry を捨ててから判定する。
    pub fn deallocate(&self, item: T) -> bool {
        let mut state = self.lock();
        if state.free.len() >= self.capacity {
            let before = state.free.len();
            state.free.retain(|entry| !self.is_stale(entry.released_at));
            state.stats.expired += (before - state.free.len()) as u64;
        }
        if state.free.len() >= self.capacity {
            state.stats.dropped += 1;
            drop(state);
            drop(item);
            return false;
        }
        state.free.push(Idle {
            item,
            released_at: Instant::now(),
        });
        state.stats.retained += 1;
        true
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_idle(&self) -> Duration {
        self.max_idle
    }

    pub fn idle(&self) -> usize {
        self.lock().free.len()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            idle: state.free.len(),
            ..state.stats
        }
    }
}
