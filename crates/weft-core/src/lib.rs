//! weft-core
//!
//! 専用 worker thread 1 本で task を投入順に実行する dispatcher。
//!
//! # モジュール構成
//! - **pool**: 再利用可能な task の bounded cache（TaskPool）
//! - **queue**: timeout 付き・割り込み可能な blocking FIFO（ReadyQueue）
//! - **task**: pool で再利用される作業単位（Task）
//! - **invoker**: task の payload を実際に実行する trait
//! - **base**: Dispatcher trait と共通の状態（alive フラグ、outstanding カウンタ）
//! - **dispatcher**: BlockingQueueDispatcher（dispatch loop と終了プロトコル）
//! - **config / stats / ids / ports**: 設定、観測、ID 生成

pub mod base;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod invoker;
pub mod pool;
pub mod ports;
pub mod queue;
pub mod stats;
pub mod task;

pub use base::{Dispatcher, DispatcherBase};
pub use config::DispatcherConfig;
pub use dispatcher::{BlockingQueueDispatcher, PendingTask, WorkerExit};
pub use error::{DispatchError, Result};
pub use ids::SubmissionId;
pub use invoker::Invoker;
pub use pool::{PoolStats, TaskPool};
pub use queue::{Interrupted, ReadyQueue};
pub use stats::DispatcherStats;
pub use task::{ErrorCallback, Task};
