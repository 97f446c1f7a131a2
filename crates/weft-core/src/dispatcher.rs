//! BlockingQueueDispatcher - 専用 worker thread 1 本で task を順番に実行する
//!
//! # 学習ポイント
//! - `thread::Builder` による名前付き worker thread
//! - Mutex + Condvar の ReadyQueue を timeout 付きで poll するループ
//! - `catch_unwind` で 1 つの task の panic を worker 全体に波及させない
//! - Drop での後始末（未投入の task を pool に返す）
//!
//! # フロー
//! 1. producer: `create_task()` → payload を詰める → `submit()`
//! 2. worker: `poll(timeout)` → execute → reset → pool に返す
//! 3. `shutdown()` / `halt()`: queue を interrupt して worker を起こし、ループを抜けさせる

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::base::{Dispatcher, DispatcherBase};
use crate::config::DispatcherConfig;
use crate::error::{DispatchError, Result};
use crate::ids::SubmissionId;
use crate::invoker::Invoker;
use crate::pool::TaskPool;
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};
use crate::queue::{Interrupted, ReadyQueue};
use crate::stats::DispatcherStats;
use crate::task::{ErrorCallback, Task};

static INSTANCE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// worker thread がループを抜けた理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// shutdown / halt / drop による割り込み
    Interrupted,
    /// ループの外側で panic した（通常は起きない）
    Panicked,
}

/// worker の終了を待つための一度きりのラッチ
///
/// 同期側は Condvar、async 側は watch channel で待つ。
struct Latch {
    done: Mutex<bool>,
    condvar: Condvar,
    signal: watch::Sender<bool>,
}

impl Latch {
    fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            done: Mutex::new(false),
            condvar: Condvar::new(),
            signal,
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        *self.lock() = true;
        self.condvar.notify_all();
        // receiver がいなくても値は残る
        self.signal.send_replace(true);
    }

    /// drop されても何も残らない（cancel safe）
    async fn released(&self) {
        let mut rx = self.signal.subscribe();
        // Sender は self が持っているので Err にはならない
        let _ = rx.wait_for(|done| *done).await;
    }

    fn is_released(&self) -> bool {
        *self.lock()
    }

    fn wait(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut done = self.lock();
        while !*done {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return false;
            }
            let (guard, _) = self
                .condvar
                .wait_timeout(done, timeout - elapsed)
                .unwrap_or_else(PoisonError::into_inner);
            done = guard;
        }
        true
    }
}

/// producer と worker が共有する状態
struct Shared<P> {
    thread_name: String,
    base: DispatcherBase<P>,
    queue: ReadyQueue<Task<P>>,
    pool: TaskPool<Task<P>>,
    ids: Box<dyn IdGenerator>,
    poll_timeout: Duration,
    terminated: Latch,
}

impl<P> Shared<P> {
    fn recycle(&self, mut task: Task<P>) {
        task.reset();
        self.pool.deallocate(task);
    }

    fn run_task(&self, task: &mut Task<P>) {
        let submission = task.id();
        let invoker = self.base.invoker();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.execute(invoker)));
        match outcome {
            Ok(Ok(())) => self.base.record_executed(),
            Ok(Err(err)) => {
                warn!(
                    dispatcher = %self.thread_name,
                    submission = ?submission,
                    error = %err,
                    "task execution failed"
                );
                self.base.record_failed();
            }
            Err(payload) => {
                error!(
                    dispatcher = %self.thread_name,
                    submission = ?submission,
                    error = %DispatchError::Panicked(panic_message(payload.as_ref())),
                    "task panicked; worker continues"
                );
                self.base.record_panicked();
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// ループを抜けたら（panic でも）必ずラッチを解放する
struct ReleaseOnDrop<'a>(&'a Latch);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// worker thread の本体
fn run_loop<P>(shared: Arc<Shared<P>>) -> WorkerExit {
    let _release = ReleaseOnDrop(&shared.terminated);
    debug!(dispatcher = %shared.thread_name, "dispatch loop started");

    loop {
        let mut task = match shared.queue.poll(shared.poll_timeout) {
            Ok(Some(task)) => task,
            Ok(None) => continue,
            Err(Interrupted) => break,
        };
        shared.run_task(&mut task);
        shared.recycle(task);
    }

    info!(
        dispatcher = %shared.thread_name,
        abandoned = shared.queue.len(),
        "dispatch loop interrupted"
    );
    WorkerExit::Interrupted
}

/// producer が populate 中の task
///
/// `submit()` は `self` を消費するので、同じ task を 2 回 enqueue することは
/// コンパイル時に防がれます。submit せずに drop した場合は pool に戻ります。
pub struct PendingTask<P> {
    task: Option<Task<P>>,
    shared: Arc<Shared<P>>,
}

impl<P> PendingTask<P> {
    pub fn with_payload(mut self, payload: P) -> Self {
        self.set_payload(payload);
        self
    }

    pub fn set_payload(&mut self, payload: P) -> &mut Self {
        if let Some(task) = self.task.as_mut() {
            task.set_payload(payload);
        }
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&DispatchError) + Send + 'static,
    {
        if let Some(task) = self.task.as_mut() {
            task.set_error_callback(Box::new(callback));
        }
        self
    }

    pub fn payload(&self) -> Option<&P> {
        self.task.as_ref().and_then(Task::payload)
    }

    /// この task が何回再利用されたものか
    pub fn generation(&self) -> u64 {
        self.task.as_ref().map_or(0, Task::generation)
    }

    /// ReadyQueue に投入する。以降 worker がいつ実行してもよい。
    ///
    /// 終了済みの dispatcher では投入せず、task はそのまま pool に戻る
    /// （outstanding カウンタも増えない）。
    pub fn submit(mut self) -> SubmissionId {
        let id = self.shared.ids.generate_submission_id();
        if !self.shared.base.alive() {
            debug!(
                dispatcher = %self.shared.thread_name,
                submission = %id,
                "task submitted after termination; recycled without running"
            );
            // Drop が pool に返す
            return id;
        }
        if let Some(mut task) = self.task.take() {
            task.stamp(id);
            self.shared.base.increment_task_count();
            self.shared.queue.enqueue(task);
        }
        id
    }
}

impl<P> Drop for PendingTask<P> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.shared.recycle(task);
        }
    }
}

pub struct BlockingQueueDispatcher<P> {
    shared: Arc<Shared<P>>,
    worker: Mutex<Option<JoinHandle<WorkerExit>>>,
}

impl<P: Send + 'static> BlockingQueueDispatcher<P> {
    pub fn new<I>(config: DispatcherConfig, invoker: I) -> Result<Self>
    where
        I: Invoker<P> + 'static,
    {
        Self::with_id_generator(config, invoker, UlidGenerator::new(SystemClock))
    }

    pub fn with_id_generator<I, G>(config: DispatcherConfig, invoker: I, ids: G) -> Result<Self>
    where
        I: Invoker<P> + 'static,
        G: IdGenerator + 'static,
    {
        config.validate()?;

        let instance = INSTANCE_COUNT.fetch_add(1, Ordering::Relaxed) + 1;
        let thread_name = format!("{}-dispatcher-{}", config.name, instance);

        let shared = Arc::new(Shared {
            thread_name: thread_name.clone(),
            base: DispatcherBase::new(Arc::new(invoker)),
            queue: ReadyQueue::new(),
            pool: TaskPool::new(config.backlog, config.max_idle(), Task::new),
            ids: Box::new(ids),
            poll_timeout: config.poll_timeout(),
            terminated: Latch::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_loop(worker_shared))
            .map_err(DispatchError::Spawn)?;

        info!(
            dispatcher = %thread_name,
            backlog = config.backlog,
            poll_timeout_ms = config.poll_timeout_ms,
            "dispatcher started"
        );

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl<P> BlockingQueueDispatcher<P> {
    /// pool から task を取り出す（なければ新規作成）
    pub fn create_task(&self) -> PendingTask<P> {
        PendingTask {
            task: Some(self.shared.pool.allocate()),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn thread_name(&self) -> &str {
        &self.shared.thread_name
    }

    pub fn outstanding(&self) -> usize {
        self.shared.base.outstanding()
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.is_released()
    }

    /// worker が終了するまで最大 `timeout` 待つ。終了していれば `true`。
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.shared.terminated.wait(timeout)
    }

    /// async context から worker の終了を待つ
    ///
    /// blocking thread は使わないので、timeout や select で drop してよい。
    pub async fn terminated(&self) {
        self.shared.terminated.released().await;
    }

    /// worker thread を join する。2 回目以降と worker 自身からの呼び出しは `None`。
    pub fn join(&self) -> Option<WorkerExit> {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
        {
            return None;
        }
        let handle = slot.take()?;
        drop(slot);
        Some(handle.join().unwrap_or(WorkerExit::Panicked))
    }

    pub fn stats(&self) -> DispatcherStats {
        let counters = &self.shared.base.counters;
        DispatcherStats {
            thread_name: self.shared.thread_name.clone(),
            alive: self.shared.base.alive(),
            terminated: self.is_terminated(),
            outstanding: self.shared.base.outstanding(),
            queued: self.shared.queue.len(),
            executed: counters.executed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            panicked: counters.panicked.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            pool: self.shared.pool.stats(),
        }
    }

    fn interrupt_worker(&self) {
        self.shared.queue.interrupt();
    }

    /// queue に残った task を捨てて pool に返す
    fn discard_pending(&self) -> usize {
        let pending = self.shared.queue.drain();
        let discarded = pending.len();
        for task in pending {
            self.shared.base.record_discarded();
            self.shared.recycle(task);
        }
        discarded
    }
}

impl<P> Dispatcher<P> for BlockingQueueDispatcher<P>
where
    P: Send + 'static,
{
    fn alive(&self) -> bool {
        self.shared.base.alive()
    }

    fn shutdown(&self) -> bool {
        let accepted = self.shared.base.shutdown();
        self.interrupt_worker();
        if accepted {
            info!(dispatcher = %self.shared.thread_name, "shutdown requested");
        }
        accepted
    }

    fn halt(&self) -> bool {
        let accepted = self.shared.base.halt();
        self.interrupt_worker();
        let discarded = self.discard_pending();
        if accepted || discarded > 0 {
            info!(
                dispatcher = %self.shared.thread_name,
                discarded,
                "halt requested"
            );
        }
        accepted
    }

    fn dispatch_with(&self, payload: P, on_error: Option<ErrorCallback>) -> Result<SubmissionId> {
        if !self.shared.base.alive() {
            return Err(DispatchError::NotAlive);
        }
        let mut pending = self.create_task();
        pending.set_payload(payload);
        if let Some(callback) = on_error
            && let Some(task) = pending.task.as_mut()
        {
            task.set_error_callback(callback);
        }
        Ok(pending.submit())
    }
}

impl<P> Drop for BlockingQueueDispatcher<P> {
    fn drop(&mut self) {
        // daemon thread と同じ扱い: 止めるだけで join はしない
        self.interrupt_worker();
    }
}
