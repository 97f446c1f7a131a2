use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use weft_core::{BlockingQueueDispatcher, DispatchError, Dispatcher, DispatcherConfig, Invoker};

const PRODUCERS: usize = 4;
const TASKS_PER_PRODUCER: usize = 25;

#[derive(Debug, Deserialize)]
struct HelloPayload {
    name: String,
    seq: usize,
}

struct HelloInvoker {
    remaining_failures: AtomicU32,
}

impl HelloInvoker {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

impl Invoker<Vec<u8>> for HelloInvoker {
    fn invoke(&self, payload: Vec<u8>) -> Result<(), DispatchError> {
        let p: HelloPayload = serde_json::from_slice(&payload)?;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(DispatchError::execution(format!(
                "intentional failure (left={left})"
            )));
        }

        println!("Hello, {} #{}!", p.name, p.seq);
        Ok(())
    }
}

fn load_config() -> Result<DispatcherConfig, DispatchError> {
    match std::env::args().nth(1) {
        Some(path) => DispatcherConfig::from_json_file(path),
        None => Ok(DispatcherConfig::new("hello", 64)),
    }
}

#[tokio::main]
async fn main() -> Result<(), DispatchError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) Dispatcher を用意（worker thread はここで起動する）
    let config = load_config()?;
    let dispatcher = Arc::new(BlockingQueueDispatcher::new(config, HelloInvoker::new(2))?);
    info!(thread = dispatcher.thread_name(), "dispatcher ready");

    // (B) producer を複数起動してタスク投入（payload は JSON bytes）
    let mut producers = Vec::with_capacity(PRODUCERS);
    for producer in 0..PRODUCERS {
        let dispatcher = Arc::clone(&dispatcher);
        producers.push(tokio::spawn(async move {
            for seq in 0..TASKS_PER_PRODUCER {
                let payload = serde_json::to_vec(&serde_json::json!({
                    "name": format!("producer-{producer}"),
                    "seq": seq,
                }))?;
                dispatcher
                    .create_task()
                    .with_payload(payload)
                    .on_error(move |e| warn!(producer, seq, error = %e, "task failed"))
                    .submit();
            }
            Ok::<(), DispatchError>(())
        }));
    }
    for p in producers {
        match p.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "producer failed"),
            Err(e) => warn!(error = %e, "producer task aborted"),
        }
    }

    // (C) 全部はけるか Ctrl-C が来るまでポーリング
    let drained = tokio::select! {
        _ = async {
            // 失敗・panic した task は outstanding に残るので、処理済み件数で判定する
            let total = (PRODUCERS * TASKS_PER_PRODUCER) as u64;
            loop {
                let stats = dispatcher.stats();
                if stats.executed + stats.failed + stats.panicked >= total {
                    break;
                }
                sleep(Duration::from_millis(50)).await;
            }
        } => true,
        _ = tokio::signal::ctrl_c() => false,
    };

    // (D) drain できたら graceful shutdown、割り込まれたら halt
    if drained {
        dispatcher.shutdown();
    } else {
        warn!("interrupted; discarding pending tasks");
        dispatcher.halt();
    }
    dispatcher.terminated().await;

    println!("{}", serde_json::to_string_pretty(&dispatcher.stats())?);
    Ok(())
}
