//! Invoker - task の中身を実際に実行する仕組み
//!
//! Dispatcher は payload の意味を知りません。worker thread は dequeue した
//! task の payload を Invoker に渡すだけです。
//!
//! # 学習ポイント
//! - クロージャへの blanket impl（`Fn(P) -> Result<()>` をそのまま Invoker として使える）

use crate::error::Result;

/// Invoker は payload を受け取って実行する
///
/// # 使用例
/// ```ignore
/// let dispatcher = BlockingQueueDispatcher::new(config, |line: String| {
///     println!("{line}");
///     Ok(())
/// })?;
/// ```
///
/// `Err` を返した場合は task の error callback に渡され、worker は次の task に進みます。
/// panic した場合も worker は止まりません。
pub trait Invoker<P>: Send + Sync {
    fn invoke(&self, payload: P) -> Result<()>;
}

impl<P, F> Invoker<P> for F
where
    F: Fn(P) -> Result<()> + Send + Sync,
{
    fn invoke(&self, payload: P) -> Result<()> {
        self(payload)
    }
}
