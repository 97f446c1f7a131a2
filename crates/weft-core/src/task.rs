//! Task - pool で再利用される作業単位
//!
//! # ライフサイクル
//! ```text
//! idle ──populate──▶ populated ──submit──▶ queued ──poll──▶ executing
//!   ▲                                                          │
//!   └──────────── deallocate ◀──── reset ◀─────────────────────┘
//! ```
//!
//! 所有権は producer → ReadyQueue → worker → TaskPool と move で移るので、
//! 同時に 2 つの thread が同じ Task を触ることはありません。

use std::fmt;

use crate::error::{DispatchError, Result};
use crate::ids::SubmissionId;
use crate::invoker::Invoker;

/// 実行失敗を受け取るコールバック
pub type ErrorCallback = Box<dyn FnOnce(&DispatchError) + Send + 'static>;

pub struct Task<P> {
    payload: Option<P>,
    id: Option<SubmissionId>,
    on_error: Option<ErrorCallback>,
    /// reset された回数（= 再利用された回数）
    generation: u64,
}

impl<P> Task<P> {
    pub fn new() -> Self {
        Self {
            payload: None,
            id: None,
            on_error: None,
            generation: 0,
        }
    }

    pub fn set_payload(&mut self, payload: P) {
        self.payload = Some(payload);
    }

    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }

    pub(crate) fn stamp(&mut self, id: SubmissionId) {
        self.id = Some(id);
    }

    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    pub fn id(&self) -> Option<SubmissionId> {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_error_callback(&self) -> bool {
        self.on_error.is_some()
    }

    /// caller 由来の状態が何も残っていないか
    pub fn is_idle(&self) -> bool {
        self.payload.is_none() && self.id.is_none() && self.on_error.is_none()
    }

    /// payload を invoker に渡して実行する
    ///
    /// 失敗したら error callback（あれば）に通知してから `Err` を返す。
    /// payload が空なら何もしない。
    pub fn execute(&mut self, invoker: &dyn Invoker<P>) -> Result<()> {
        let Some(payload) = self.payload.take() else {
            return Ok(());
        };
        let result = invoker.invoke(payload);
        if let Err(err) = &result
            && let Some(callback) = self.on_error.take()
        {
            callback(err);
        }
        result
    }

    /// caller 由来の状態をすべて消す
    pub fn reset(&mut self) {
        self.payload = None;
        self.id = None;
        self.on_error = None;
        self.generation += 1;
    }
}

impl<P> Default for Task<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Task<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("has_payload", &self.payload.is_some())
            .field("has_error_callback", &self.on_error.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}
