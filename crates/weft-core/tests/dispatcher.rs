use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rstest::rstest;
use weft_core::{BlockingQueueDispatcher, DispatchError, Dispatcher, DispatcherConfig, WorkerExit};

fn config(backlog: usize) -> DispatcherConfig {
    DispatcherConfig::new("it", backlog)
        .with_poll_timeout(Duration::from_millis(50))
        .with_max_idle(Duration::from_secs(60))
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn recording(seen: Arc<Mutex<Vec<u32>>>) -> impl Fn(u32) -> weft_core::Result<()> + Send + Sync {
    move |n: u32| {
        seen.lock().unwrap().push(n);
        Ok(())
    }
}

#[test]
fn tasks_from_one_producer_run_in_submission_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = BlockingQueueDispatcher::new(config(16), recording(Arc::clone(&seen))).unwrap();

    for n in 0..200 {
        dispatcher.dispatch(n).unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || dispatcher.outstanding() == 0));

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, (0..200).collect::<Vec<_>>());
    dispatcher.shutdown();
}

#[test]
fn concurrent_producers_keep_their_own_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = Arc::new(
        BlockingQueueDispatcher::new(config(8), recording(Arc::clone(&seen))).unwrap(),
    );

    let producers: Vec<_> = (0..4u32)
        .map(|p| {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || {
                for i in 0..100u32 {
                    dispatcher.create_task().with_payload(p * 1000 + i).submit();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || dispatcher.outstanding() == 0));
    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 400);
    for p in 0..4u32 {
        let mine: Vec<_> = seen.iter().copied().filter(|n| n / 1000 == p).collect();
        assert_eq!(mine, (0..100).map(|i| p * 1000 + i).collect::<Vec<_>>());
    }
    dispatcher.shutdown();
}

#[test]
fn failing_task_does_not_stop_the_worker() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let dispatcher = BlockingQueueDispatcher::new(config(4), move |n: u32| {
        if n == 0 {
            return Err(DispatchError::execution("task A fails"));
        }
        sink.lock().unwrap().push(n);
        Ok(())
    })
    .unwrap();

    let reported = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reported);
    dispatcher
        .create_task()
        .with_payload(0)
        .on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .submit();
    dispatcher.dispatch(1).unwrap();

    assert!(wait_until(Duration::from_secs(5), || dispatcher.stats().executed == 1));
    let stats = dispatcher.stats();
    assert_eq!(*seen.lock().unwrap(), vec![1]);
    assert_eq!(stats.failed, 1);
    // 失敗した task は正常実行とみなさないので outstanding に残る
    assert_eq!(stats.outstanding, 1);
    assert_eq!(reported.load(Ordering::SeqCst), 1);
    assert!(dispatcher.alive());
    dispatcher.shutdown();
}

#[test]
fn panicking_task_does_not_kill_the_worker() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let dispatcher = BlockingQueueDispatcher::new(config(4), move |n: u32| {
        if n == 0 {
            panic!("task A panics");
        }
        sink.lock().unwrap().push(n);
        Ok::<(), DispatchError>(())
    })
    .unwrap();

    dispatcher.dispatch(0).unwrap();
    dispatcher.dispatch(1).unwrap();

    assert!(wait_until(Duration::from_secs(5), || dispatcher.stats().executed == 1));
    let stats = dispatcher.stats();
    assert_eq!(*seen.lock().unwrap(), vec![1]);
    assert_eq!(stats.panicked, 1);
    // panic した task は正常実行とみなさない
    assert_eq!(stats.outstanding, 1);
    assert!(!dispatcher.is_terminated());

    // panic した task も pool に戻っている
    assert!(wait_until(Duration::from_secs(5), || dispatcher.stats().pool.retained == 2));
    dispatcher.shutdown();
}

#[test]
fn sequential_submissions_reuse_pooled_tasks() {
    let backlog = 2;
    let dispatcher =
        BlockingQueueDispatcher::new(config(backlog), |_: u32| Ok::<(), DispatchError>(())).unwrap();

    for n in 0..(backlog as u32 + 10) {
        dispatcher.dispatch(n).unwrap();
        assert!(wait_until(Duration::from_secs(5), || dispatcher.outstanding() == 0));
    }
    assert!(wait_until(Duration::from_secs(5), || {
        let pool = dispatcher.stats().pool;
        pool.retained + pool.dropped == backlog as u64 + 10
    }));

    let pool = dispatcher.stats().pool;
    // 同時に in-flight になりうるのは実行中の 1 件と、その直後に作った 1 件だけ
    assert!(pool.created <= backlog as u64 + 1, "created {}", pool.created);
    assert!(pool.idle <= backlog);
    dispatcher.shutdown();
}

#[test]
fn burst_never_retains_more_than_backlog() {
    let backlog = 2;
    let dispatcher =
        BlockingQueueDispatcher::new(config(backlog), |_: u32| Ok::<(), DispatchError>(())).unwrap();

    let pending: Vec<_> = (0..10u32)
        .map(|n| dispatcher.create_task().with_payload(n))
        .collect();
    for task in pending {
        task.submit();
    }

    assert!(wait_until(Duration::from_secs(5), || {
        let pool = dispatcher.stats().pool;
        pool.retained + pool.dropped == 10
    }));
    let pool = dispatcher.stats().pool;
    assert_eq!(pool.created, 10);
    assert_eq!(pool.idle, backlog);
    assert_eq!(pool.dropped, 8);
    dispatcher.shutdown();
}

#[test]
fn reused_task_carries_no_state_from_previous_run() {
    let dispatcher = BlockingQueueDispatcher::new(config(1), |payload: Vec<String>| {
        if payload.iter().any(|s| s == "fail") {
            return Err(DispatchError::execution("bad payload"));
        }
        Ok(())
    })
    .unwrap();

    let callbacks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&callbacks);
    dispatcher
        .create_task()
        .with_payload(vec!["secret".to_string(), "fail".to_string()])
        .on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .submit();
    assert!(wait_until(Duration::from_secs(5), || dispatcher.stats().pool.idle == 1));

    let reused = dispatcher.create_task();
    assert_eq!(reused.generation(), 1);
    assert!(reused.payload().is_none());

    // 前回の error callback が残っていれば 2 回目の失敗でも呼ばれてしまう
    reused.with_payload(vec!["fail".to_string()]).submit();
    assert!(wait_until(Duration::from_secs(5), || dispatcher.stats().failed == 2));
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
    dispatcher.shutdown();
}

#[test]
fn shutdown_wakes_an_idle_worker_immediately() {
    let poll_timeout = Duration::from_secs(5);
    let dispatcher = BlockingQueueDispatcher::new(
        DispatcherConfig::new("idle", 4).with_poll_timeout(poll_timeout),
        |_: u32| Ok::<(), DispatchError>(()),
    )
    .unwrap();

    // worker が poll でブロックするまで待つ
    thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    assert!(dispatcher.shutdown());
    assert!(dispatcher.await_termination(poll_timeout));
    assert!(start.elapsed() < Duration::from_secs(1), "took {:?}", start.elapsed());
}

#[test]
fn worker_stops_within_one_poll_interval_by_default() {
    let defaults = DispatcherConfig::default();
    let dispatcher =
        BlockingQueueDispatcher::new(defaults.clone(), |_: u32| Ok::<(), DispatchError>(())).unwrap();
    thread::sleep(Duration::from_millis(20));

    dispatcher.halt();
    assert!(dispatcher.await_termination(defaults.poll_timeout()));
}

#[rstest]
#[case::shutdown_first(true)]
#[case::halt_first(false)]
fn termination_is_idempotent(#[case] shutdown_first: bool) {
    let dispatcher =
        BlockingQueueDispatcher::new(config(4), |_: u32| Ok::<(), DispatchError>(())).unwrap();

    let (first, second) = if shutdown_first {
        (dispatcher.shutdown(), dispatcher.halt())
    } else {
        (dispatcher.halt(), dispatcher.shutdown())
    };
    assert!(first);
    assert!(!second);
    assert!(!dispatcher.shutdown());
    assert!(!dispatcher.halt());

    assert_eq!(dispatcher.join(), Some(WorkerExit::Interrupted));
    assert!(!dispatcher.alive());
    assert!(matches!(dispatcher.dispatch(1), Err(DispatchError::NotAlive)));
}

#[test]
fn termination_can_be_requested_from_many_threads() {
    let dispatcher = Arc::new(
        BlockingQueueDispatcher::new(config(4), |_: u32| Ok::<(), DispatchError>(())).unwrap(),
    );
    let accepted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            let accepted = Arc::clone(&accepted);
            thread::spawn(move || {
                let won = if i % 2 == 0 { dispatcher.shutdown() } else { dispatcher.halt() };
                if won {
                    accepted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert!(dispatcher.await_termination(Duration::from_secs(2)));
}

#[tokio::test]
async fn terminated_can_be_awaited() {
    let dispatcher =
        BlockingQueueDispatcher::new(config(4), |_: u32| Ok::<(), DispatchError>(())).unwrap();
    dispatcher.dispatch(1).unwrap();
    dispatcher.shutdown();

    tokio::time::timeout(Duration::from_secs(2), dispatcher.terminated())
        .await
        .expect("worker should stop");
    assert!(dispatcher.stats().terminated);
}
