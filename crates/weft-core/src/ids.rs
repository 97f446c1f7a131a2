//! SubmissionId - 投入ごとの識別子
//!
//! Task の実体は pool で再利用されるため、Task 自体には恒久的な ID を持たせません。
//! 代わりに「投入（submission）」ごとに ULID を振り、ログの相関に使います。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: 同一 producer からの投入順でソートできる
//! - **UUID互換**: 128-bit

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(Ulid);

impl SubmissionId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// ULID に埋め込まれた timestamp（ms）
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl From<Ulid> for SubmissionId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}
