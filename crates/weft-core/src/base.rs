//! Dispatcher base - どの Dispatcher 実装にも共通する状態と契約
//!
//! # 主要コンポーネント
//! - **Dispatcher** trait: producer から見える操作（dispatch / shutdown / halt）
//! - **DispatcherBase**: alive フラグ、outstanding task カウンタ、Invoker の保持
//!
//! BlockingQueueDispatcher は DispatcherBase を持ち、queue と worker thread の
//! 管理だけを自分で行います。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::error::Result;
use crate::ids::SubmissionId;
use crate::invoker::Invoker;
use crate::task::ErrorCallback;

/// Dispatcher は task を受け付けて実行する
///
/// # 終了の 2 モード
/// - `shutdown()`: worker を止める。queue に残った task は放置される
/// - `halt()`: worker を止め、queue に残った task も破棄する
///
/// どちらも何度呼んでもよく、状態を変えた最初の呼び出しだけが `true` を返します。
pub trait Dispatcher<P>: Send + Sync {
    fn alive(&self) -> bool;

    fn shutdown(&self) -> bool;

    fn halt(&self) -> bool;

    /// payload を task に詰めて投入する。終了後は `DispatchError::NotAlive`。
    fn dispatch_with(&self, payload: P, on_error: Option<ErrorCallback>) -> Result<SubmissionId>;

    fn dispatch(&self, payload: P) -> Result<SubmissionId> {
        self.dispatch_with(payload, None)
    }
}

/// 実行結果ごとの累積カウンタ
#[derive(Debug, Default)]
pub(crate) struct ExecutionCounters {
    pub(crate) executed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) panicked: AtomicU64,
    pub(crate) discarded: AtomicU64,
}

pub struct DispatcherBase<P> {
    alive: AtomicBool,
    outstanding: AtomicUsize,
    invoker: Arc<dyn Invoker<P>>,
    pub(crate) counters: ExecutionCounters,
}

impl<P> DispatcherBase<P> {
    pub fn new(invoker: Arc<dyn Invoker<P>>) -> Self {
        Self {
            alive: AtomicBool::new(true),
            outstanding: AtomicUsize::new(0),
            invoker,
            counters: ExecutionCounters::default(),
        }
    }

    pub fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// alive → dead に遷移させたのがこの呼び出しなら `true`
    pub fn shutdown(&self) -> bool {
        self.alive
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// bookkeeping は shutdown と同じ。破棄処理は実装側で行う。
    pub fn halt(&self) -> bool {
        self.shutdown()
    }

    pub fn invoker(&self) -> &dyn Invoker<P> {
        self.invoker.as_ref()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn increment_task_count(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decrement_task_count(&self) {
        // 0 未満にはしない
        let _ = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub(crate) fn record_executed(&self) {
        self.counters.executed.fetch_add(1, Ordering::Relaxed);
        self.decrement_task_count();
    }

    /// outstanding を減らすのは正常に実行できた task だけ。
    /// `Err` と panic は件数だけ数える。
    pub(crate) fn record_failed(&self) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panicked(&self) {
        self.counters.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.counters.discarded.fetch_add(1, Ordering::Relaxed);
        self.decrement_task_count();
    }
}
