//! IdGenerator port - SubmissionId 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock + 乱数で ULID を組み立てる

use crate::ids::SubmissionId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は SubmissionId を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数 producer thread から呼ばれる）
pub trait IdGenerator: Send + Sync {
    fn generate_submission_id(&self) -> SubmissionId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// テスト時に FixedClock を使えば timestamp 部分を固定できます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_submission_id(&self) -> SubmissionId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        SubmissionId::from(ulid)
    }
}
