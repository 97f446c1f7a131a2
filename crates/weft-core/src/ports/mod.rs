//! Ports - 差し替え可能な外部依存
//!
//! テストで決定的な値を使えるよう、時刻と ID 生成を trait にしています。

pub mod clock;
pub mod id_generator;

pub use self::clock::{Clock, SystemClock};
#[cfg(test)]
pub use self::clock::FixedClock;
pub use self::id_generator::{IdGenerator, UlidGenerator};
