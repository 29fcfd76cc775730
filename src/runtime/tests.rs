//! End-to-end tests for `Runtime` with real worker threads.
//!
//! Most tests stage their tasks on a runtime created `Suspended`, then
//! `resume()` and wait for quiescence, so nothing runs while tasks are
//! still being submitted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use crate::config::RuntimeConfig;
use crate::error::KernelError;
use crate::queue::QueueBackend;
use crate::sync::ResourceId;
use crate::worker::{WorkerId, WorkerState};

use super::{Runtime, RuntimeState};

const SETTLE: Duration = Duration::from_secs(10);

type Log = Arc<Mutex<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn staged(backend: QueueBackend) -> Runtime {
    init_tracing();
    Runtime::new(
        RuntimeConfig::default()
            .with_waiting_queue(backend)
            .with_start_suspended(true),
    )
}

fn run(rt: &Runtime) {
    rt.resume().unwrap();
    rt.wait_quiescent(SETTLE).unwrap();
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

// ── Ordering ──────────────────────────────────────────────────────────

#[test]
fn test_time_then_fifo_order() {
    for backend in [QueueBackend::Tree, QueueBackend::Calendar] {
        let rt = staged(backend);
        let log = Log::default();
        for (time, name) in [(5.0, "A"), (5.0, "B"), (2.0, "C"), (10.0, "D")] {
            let log = Arc::clone(&log);
            rt.submit_at(time, move |cx| {
                log.lock().push(format!("{}@{}", name, cx.now()));
                Ok(())
            })
            .unwrap();
        }
        assert!(entries(&log).is_empty(), "nothing runs while suspended");

        run(&rt);
        assert_eq!(entries(&log), vec!["C@2", "A@5", "B@5", "D@10"]);
        assert_eq!(rt.now(), 10.0);
        assert_eq!(rt.state(), RuntimeState::Inactive);

        let stats = rt.stats();
        assert_eq!(stats.tasks_executed, 4);
        assert_eq!(stats.workers_spawned, 1);
        assert_eq!(stats.ready + stats.waiting, 0);
    }
}

#[test]
fn test_submission_starts_an_inactive_runtime() {
    init_tracing();
    let rt = Runtime::with_defaults();
    let log = Log::default();
    let l = Arc::clone(&log);
    rt.submit_at(3.0, move |cx| {
        l.lock().push(format!("ran@{}", cx.now()));
        Ok(())
    })
    .unwrap();
    rt.wait_quiescent(SETTLE).unwrap();
    assert_eq!(entries(&log), vec!["ran@3"]);

    let l = Arc::clone(&log);
    rt.submit_after(1.5, move |cx| {
        l.lock().push(format!("ran@{}", cx.now()));
        Ok(())
    })
    .unwrap();
    rt.wait_quiescent(SETTLE).unwrap();
    assert_eq!(entries(&log), vec!["ran@3", "ran@4.5"]);
}

#[test]
fn test_same_time_submissions_keep_fifo() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();

    let l = Arc::clone(&log);
    rt.submit_at(1.0, move |cx| {
        l.lock().push("A".into());
        for name in ["X", "Y"] {
            let l = Arc::clone(&l);
            cx.submit_at(cx.now(), move |_| {
                l.lock().push(name.into());
                Ok(())
            })?;
        }
        Ok(())
    })
    .unwrap();
    let l = Arc::clone(&log);
    rt.submit_at(1.0, move |_| {
        l.lock().push("B".into());
        Ok(())
    })
    .unwrap();

    run(&rt);
    assert_eq!(entries(&log), vec!["A", "B", "X", "Y"]);
}

#[test]
fn test_follow_up_runs_before_blocked_submitter_resumes() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();

    let l = Arc::clone(&log);
    rt.submit_at(1.0, move |cx| {
        let inner = Arc::clone(&l);
        cx.submit_at(cx.now(), move |cx| {
            inner.lock().push(format!("X@{}", cx.now()));
            Ok(())
        })?;
        cx.sleep_for(1.0)?;
        l.lock().push(format!("A woke@{}", cx.now()));
        Ok(())
    })
    .unwrap();

    run(&rt);
    assert_eq!(entries(&log), vec!["X@1", "A woke@2"]);
}

#[test]
fn test_calendar_backend_under_load() {
    let rt = staged(QueueBackend::Calendar);
    let log: Arc<Mutex<Vec<(f64, usize)>>> = Arc::default();
    let mut rng = StdRng::seed_from_u64(7);

    for seq in 0..300 {
        // One decimal place so plenty of times collide.
        let time = (rng.gen_range(0.0..100.0_f64) * 10.0).round() / 10.0;
        let log = Arc::clone(&log);
        rt.submit_at(time, move |cx| {
            log.lock().push((cx.now(), seq));
            Ok(())
        })
        .unwrap();
    }

    run(&rt);
    let seen = log.lock().clone();
    assert_eq!(seen.len(), 300);
    let mut sorted = seen.clone();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    assert_eq!(seen, sorted);
}

// ── Sleeping and time ─────────────────────────────────────────────────

#[test]
fn test_sleep_until_and_past_times() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();
    let l = Arc::clone(&log);
    rt.submit_at(0.0, move |cx| {
        cx.sleep_until(3.5)?;
        l.lock().push(format!("{}", cx.now()));
        cx.sleep_until(1.0)?;
        l.lock().push(format!("{}", cx.now()));
        assert!(matches!(cx.sleep_for(-1.0), Err(KernelError::InvalidTime(_))));
        assert!(matches!(cx.sleep_until(f64::NAN), Err(KernelError::InvalidTime(_))));
        assert!(matches!(
            cx.submit_at(0.5, |_| Ok(())),
            Err(KernelError::NonCausal { .. })
        ));
        Ok(())
    })
    .unwrap();

    run(&rt);
    assert_eq!(entries(&log), vec!["3.5", "3.5"]);
    assert!(rt.faults().is_empty());
    assert!(matches!(
        rt.submit_at(1.0, |_| Ok(())),
        Err(KernelError::NonCausal { .. })
    ));
    assert!(matches!(
        rt.submit_at(f64::INFINITY, |_| Ok(())),
        Err(KernelError::InvalidTime(_))
    ));
    assert!(matches!(
        rt.submit_after(-0.5, |_| Ok(())),
        Err(KernelError::InvalidTime(_))
    ));
}

// ── Locks ─────────────────────────────────────────────────────────────

#[test]
fn test_lock_hand_off_is_fifo() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();
    let r = ResourceId::new(1);

    let l = Arc::clone(&log);
    rt.submit_at(0.0, move |cx| {
        cx.lock(r)?;
        l.lock().push(format!("a locked@{}", cx.now()));
        cx.sleep_for(1.0)?;
        l.lock().push(format!("a unlock@{}", cx.now()));
        cx.unlock(r);
        Ok(())
    })
    .unwrap();
    for (time, name) in [(0.5, "b"), (0.75, "c"), (1.0, "d")] {
        let l = Arc::clone(&log);
        rt.submit_at(time, move |cx| {
            cx.lock(r)?;
            l.lock().push(format!("{} locked@{}", name, cx.now()));
            cx.unlock(r);
            Ok(())
        })
        .unwrap();
    }

    run(&rt);
    assert_eq!(
        entries(&log),
        vec!["a locked@0", "a unlock@1", "b locked@1", "c locked@1", "d locked@1"]
    );
    let info = rt.lock_info(r).unwrap();
    assert_eq!(info.holder, None);
    assert_eq!(info.hold_count, 0);
    assert_eq!(info.lock_requesters, 0);
    assert_eq!(rt.stats().workers_spawned, 4);
}

#[test]
fn test_unlock_by_non_holder_is_ignored() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();
    let r = ResourceId::new(9);

    let l = Arc::clone(&log);
    rt.submit_at(0.0, move |cx| {
        cx.lock(r)?;
        cx.sleep_for(2.0)?;
        l.lock().push(format!("a unlock@{}", cx.now()));
        cx.unlock(r);
        Ok(())
    })
    .unwrap();
    rt.submit_at(1.0, move |cx| {
        cx.unlock(r);
        cx.unlock(ResourceId::new(10));
        Ok(())
    })
    .unwrap();
    let l = Arc::clone(&log);
    rt.submit_at(1.5, move |cx| {
        cx.lock(r)?;
        l.lock().push(format!("c locked@{}", cx.now()));
        cx.unlock(r);
        Ok(())
    })
    .unwrap();

    run(&rt);
    assert_eq!(entries(&log), vec!["a unlock@2", "c locked@2"]);
    assert_eq!(rt.lock_info(r).unwrap().holder, None);
    assert!(rt.lock_info(ResourceId::new(10)).is_none());
}

#[test]
fn test_completed_task_releases_its_locks() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();
    let r = ResourceId::new(1);

    // Returns on W0 without unlocking.
    rt.submit_at(0.0, move |cx| {
        cx.lock(r)?;
        cx.sleep_for(1.0)
    })
    .unwrap();
    let l = Arc::clone(&log);
    rt.submit_at(0.5, move |cx| {
        cx.lock(r)?;
        l.lock().push(format!("h locked@{} on {}", cx.now(), cx.worker_id()));
        cx.sleep_for(2.0)?;
        l.lock().push(format!("h unlock@{}", cx.now()));
        cx.unlock(r);
        Ok(())
    })
    .unwrap();
    // Recycled onto W0, which must not inherit the first task's hold.
    let l = Arc::clone(&log);
    rt.submit_at(2.0, move |cx| {
        cx.lock(r)?;
        l.lock().push(format!("d locked@{} on {}", cx.now(), cx.worker_id()));
        cx.unlock(r);
        Ok(())
    })
    .unwrap();

    run(&rt);
    assert_eq!(
        entries(&log),
        vec!["h locked@1 on W1", "h unlock@3", "d locked@3 on W0"]
    );
    let info = rt.lock_info(r).unwrap();
    assert_eq!(info.holder, None);
    assert_eq!(info.hold_count, 0);
    assert_eq!(rt.stats().workers_spawned, 2);
    assert_eq!(rt.stats().faults, 0);
}

// ── Wait / notify ─────────────────────────────────────────────────────

#[test]
fn test_notify_all_wakes_only_that_resource() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();
    let r = ResourceId::new(1);
    let other = ResourceId::new(2);

    for name in ["w1", "w2"] {
        let l = Arc::clone(&log);
        rt.submit_at(0.0, move |cx| {
            cx.lock(r)?;
            cx.wait(r)?;
            l.lock().push(format!("{}@{}", name, cx.now()));
            cx.unlock(r);
            Ok(())
        })
        .unwrap();
    }
    let l = Arc::clone(&log);
    rt.submit_at(0.0, move |cx| {
        cx.lock(other)?;
        cx.wait(other)?;
        l.lock().push("bystander woke".into());
        Ok(())
    })
    .unwrap();
    let l = Arc::clone(&log);
    rt.submit_at(1.0, move |cx| {
        cx.lock(r)?;
        let woken = cx.notify_all(r);
        l.lock().push(format!("notified {}", woken));
        cx.unlock(r);
        Ok(())
    })
    .unwrap();

    run(&rt);
    assert_eq!(entries(&log), vec!["notified 2", "w1@1", "w2@1"]);

    let waiting: Vec<_> = rt
        .workers()
        .into_iter()
        .filter(|w| w.state == WorkerState::Waiting)
        .collect();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].sleep_target, Some(other));
    assert_eq!(rt.lock_info(other).unwrap().waiters, 1);
    assert_eq!(rt.lock_info(other).unwrap().holder, None);
    assert_eq!(rt.lock_info(r).unwrap().waiters, 0);
    assert_eq!(rt.lock_info(r).unwrap().holder, None);

    // The bystander is cancelled rather than woken.
    rt.reset().unwrap();
    assert!(!entries(&log).contains(&"bystander woke".to_string()));
}

#[test]
fn test_notify_wakes_one_in_fifo_order() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();
    let r = ResourceId::new(3);

    for name in ["first", "second"] {
        let l = Arc::clone(&log);
        rt.submit_at(0.0, move |cx| {
            cx.lock(r)?;
            cx.wait(r)?;
            l.lock().push(format!("{}@{}", name, cx.now()));
            cx.unlock(r);
            Ok(())
        })
        .unwrap();
    }
    for time in [1.0, 2.0, 3.0] {
        let l = Arc::clone(&log);
        rt.submit_at(time, move |cx| {
            let woken = cx.notify(r);
            l.lock().push(format!("notify={}", woken));
            Ok(())
        })
        .unwrap();
    }

    run(&rt);
    assert_eq!(
        entries(&log),
        vec!["notify=1", "first@1", "notify=1", "second@2", "notify=0"]
    );
}

#[test]
fn test_wait_restores_hold_count() {
    let rt = staged(QueueBackend::Tree);
    let r = ResourceId::new(4);
    rt.submit_at(0.0, move |cx| {
        cx.lock(r)?;
        cx.lock(r)?;
        cx.wait(r)?;
        // Held twice again; drop one count and keep the other.
        cx.unlock(r);
        Ok(())
    })
    .unwrap();
    rt.submit_at(1.0, move |cx| {
        cx.lock(r)?;
        cx.notify(r);
        cx.unlock(r);
        Ok(())
    })
    .unwrap();

    run(&rt);
    let info = rt.lock_info(r).unwrap();
    assert_eq!(info.holder, Some(WorkerId::new(0)));
    assert_eq!(info.hold_count, 1);
}

#[test]
fn test_wait_without_holding_reacquires_nothing() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();
    let r = ResourceId::new(5);
    let l = Arc::clone(&log);
    rt.submit_at(0.0, move |cx| {
        cx.wait(r)?;
        l.lock().push(format!("woke@{}", cx.now()));
        Ok(())
    })
    .unwrap();
    rt.submit_at(2.0, move |cx| {
        assert_eq!(cx.notify(r), 1);
        Ok(())
    })
    .unwrap();

    run(&rt);
    assert_eq!(entries(&log), vec!["woke@2"]);
    assert_eq!(rt.lock_info(r).unwrap().holder, None);
}

// ── Suspend / resume ──────────────────────────────────────────────────

#[test]
fn test_stop_from_inside_then_resume() {
    let rt = staged(QueueBackend::Tree);
    let log: Arc<Mutex<Vec<f64>>> = Arc::default();
    for i in 1..=10 {
        let log = Arc::clone(&log);
        rt.submit_at(i as f64, move |cx| {
            log.lock().push(cx.now());
            if i == 5 {
                cx.stop();
            }
            Ok(())
        })
        .unwrap();
    }

    run(&rt);
    assert_eq!(rt.state(), RuntimeState::Suspended);
    assert_eq!(*log.lock(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(rt.now(), 5.0);
    assert_eq!(rt.stats().waiting, 5);

    run(&rt);
    assert_eq!(rt.state(), RuntimeState::Inactive);
    let expected: Vec<f64> = (1..=10).map(|i| i as f64).collect();
    assert_eq!(*log.lock(), expected);
    assert_eq!(rt.now(), 10.0);
}

#[test]
fn test_host_stop_mid_run_then_resume() {
    let rt = staged(QueueBackend::Calendar);
    let log: Arc<Mutex<Vec<(String, f64)>>> = Arc::default();
    for (name, start) in [("a", 0.0), ("b", 0.5)] {
        let log = Arc::clone(&log);
        rt.submit_at(start, move |cx| {
            for _ in 0..10 {
                log.lock().push((name.to_string(), cx.now()));
                cx.sleep_for(1.0)?;
            }
            Ok(())
        })
        .unwrap();
    }
    // Holds the run at 4.25 until the host has asked for a stop.
    let go = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&go);
    let l = Arc::clone(&log);
    rt.submit_at(4.25, move |cx| {
        while !gate.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        l.lock().push(("gate".to_string(), cx.now()));
        Ok(())
    })
    .unwrap();

    rt.resume().unwrap();
    rt.stop(false).unwrap();
    go.store(true, Ordering::SeqCst);
    rt.stop(true).unwrap();
    assert_eq!(rt.state(), RuntimeState::Suspended);

    let partial = log.lock().clone();
    assert!(!partial.is_empty());
    assert!(partial.windows(2).all(|w| w[0].1 < w[1].1));
    let stopped_at = rt.now();
    assert_eq!(partial.last().map(|e| e.1), Some(stopped_at));
    assert!(stopped_at <= 4.25);

    run(&rt);
    assert_eq!(rt.state(), RuntimeState::Inactive);
    let mut expected: Vec<(String, f64)> = (0..10)
        .flat_map(|i| [("a".to_string(), i as f64), ("b".to_string(), i as f64 + 0.5)])
        .collect();
    expected.insert(9, ("gate".to_string(), 4.25));
    let full = log.lock().clone();
    assert_eq!(full, expected);
    assert_eq!(&full[..partial.len()], &partial[..]);
    assert!(full[partial.len()].1 > stopped_at);
    assert_eq!(rt.now(), 10.5);
}

#[test]
fn test_stop_on_inactive_suspends_immediately() {
    init_tracing();
    let rt = Runtime::with_defaults();
    rt.stop(true).unwrap();
    assert_eq!(rt.state(), RuntimeState::Suspended);
    rt.submit_at(1.0, |_| Ok(())).unwrap();
    assert_eq!(rt.stats().waiting, 1);
    run(&rt);
    assert_eq!(rt.stats().tasks_executed, 1);
}

#[test]
fn test_blocking_stop_times_out_on_spinning_task() {
    init_tracing();
    let rt = Runtime::new(RuntimeConfig::default().with_quiescence(3, Duration::from_millis(10)));
    let release = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&release);
    rt.submit_at(0.0, move |_| {
        while !flag.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        Ok(())
    })
    .unwrap();

    match rt.stop(true) {
        Err(KernelError::QuiescenceTimeout { operation, stuck }) => {
            assert_eq!(operation, "stop");
            assert_eq!(stuck, vec![WorkerId::new(0)]);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(rt.state(), RuntimeState::Suspending);

    release.store(true, Ordering::SeqCst);
    rt.wait_quiescent(SETTLE).unwrap();
    assert_eq!(rt.state(), RuntimeState::Suspended);
    rt.resume().unwrap();
    rt.wait_quiescent(SETTLE).unwrap();
    assert_eq!(rt.state(), RuntimeState::Inactive);
}

// ── Reset ─────────────────────────────────────────────────────────────

#[test]
fn test_reset_clears_everything_and_is_idempotent() {
    let rt = staged(QueueBackend::Calendar);
    let r = ResourceId::new(1);
    rt.submit_at(1.0, move |cx| {
        cx.lock(r)?;
        cx.sleep_for(100.0)?;
        cx.unlock(r);
        Ok(())
    })
    .unwrap();
    rt.submit_at(2.0, move |cx| {
        cx.lock(r)?;
        Ok(())
    })
    .unwrap();
    rt.submit_at(50.0, |_| Ok(())).unwrap();
    rt.submit_at(60.0, |cx| {
        cx.stop();
        Ok(())
    })
    .unwrap();
    run(&rt);
    assert_eq!(rt.state(), RuntimeState::Suspended);
    assert_eq!(rt.workers().len(), 3);
    assert_eq!(rt.stats().waiting, 1);

    rt.reset().unwrap();
    assert_eq!(rt.now(), 0.0);
    assert_eq!(rt.state(), RuntimeState::Inactive);
    assert!(rt.workers().is_empty());
    assert!(rt.lock_info(r).is_none());
    let stats = rt.stats();
    assert_eq!(stats.ready, 0);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.tasks_executed, 0);

    rt.reset().unwrap();
    assert_eq!(rt.state(), RuntimeState::Inactive);

    // Usable again afterwards, starting from a fresh worker pool.
    let log = Log::default();
    let l = Arc::clone(&log);
    rt.submit_at(2.0, move |cx| {
        l.lock().push(format!("{} {}", cx.worker_id(), cx.now()));
        Ok(())
    })
    .unwrap();
    rt.wait_quiescent(SETTLE).unwrap();
    assert_eq!(entries(&log), vec!["W0 2"]);
}

#[test]
fn test_reset_times_out_then_retries() {
    init_tracing();
    let rt = Runtime::new(RuntimeConfig::default().with_quiescence(2, Duration::from_millis(10)));
    let release = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&release);
    rt.submit_at(0.0, move |cx| {
        while !flag.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        assert!(cx.is_cancelled());
        Ok(())
    })
    .unwrap();

    assert!(matches!(
        rt.reset(),
        Err(KernelError::QuiescenceTimeout { operation: "reset", .. })
    ));
    assert_eq!(rt.state(), RuntimeState::Resetting);
    assert!(matches!(
        rt.resume(),
        Err(KernelError::InvalidState { operation: "resume", .. })
    ));
    assert!(rt.stop(false).is_err());
    assert!(rt.wait_quiescent(Duration::from_millis(1)).is_err());

    release.store(true, Ordering::SeqCst);
    let mut attempts = 0;
    while let Err(e) = rt.reset() {
        assert!(matches!(e, KernelError::QuiescenceTimeout { .. }));
        attempts += 1;
        assert!(attempts < 100, "worker never retired");
    }
    assert_eq!(rt.state(), RuntimeState::Inactive);
    assert!(rt.workers().is_empty());
}

#[test]
fn test_handles_from_before_reset_cancel_nothing() {
    let rt = staged(QueueBackend::Tree);
    let stale = rt.submit_at(5.0, |_| Ok(())).unwrap();
    rt.reset().unwrap();

    rt.stop(false).unwrap();
    let log = Log::default();
    let l = Arc::clone(&log);
    let fresh = rt
        .submit_at(5.0, move |_| {
            l.lock().push("fresh".into());
            Ok(())
        })
        .unwrap();
    assert_ne!(stale, fresh);
    assert!(!rt.cancel(stale));

    run(&rt);
    assert_eq!(entries(&log), vec!["fresh"]);
}

#[test]
fn test_drop_cancels_blocked_workers() {
    let rt = staged(QueueBackend::Tree);
    let r = ResourceId::new(1);
    let log = Log::default();
    let l = Arc::clone(&log);
    rt.submit_at(0.0, move |cx| {
        let err = cx.wait(r).unwrap_err();
        l.lock().push(format!("{}", err.is_cancelled()));
        Err(err)
    })
    .unwrap();
    run(&rt);
    drop(rt);
    assert_eq!(entries(&log), vec!["true"]);
}

// ── Faults and misuse ─────────────────────────────────────────────────

#[test]
fn test_faults_are_recorded_and_do_not_stop_the_run() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();
    let r = ResourceId::new(1);

    rt.submit_at(1.0, move |cx| {
        cx.lock(r)?;
        panic!("boom");
    })
    .unwrap();
    rt.submit_at(2.0, |_| Err(KernelError::fault("bad input")))
        .unwrap();
    let l = Arc::clone(&log);
    rt.submit_at(3.0, move |cx| {
        cx.lock(r)?;
        l.lock().push(format!("after@{}", cx.now()));
        cx.unlock(r);
        Ok(())
    })
    .unwrap();

    run(&rt);
    assert_eq!(entries(&log), vec!["after@3"]);

    let faults = rt.faults();
    assert_eq!(faults.len(), 2);
    assert!(faults[0].message.contains("boom"));
    assert_eq!(faults[0].time.value(), 1.0);
    assert_eq!(faults[0].worker, WorkerId::new(0));
    assert!(faults[0].task.is_some());
    assert!(faults[1].message.contains("bad input"));

    let stats = rt.stats();
    assert_eq!(stats.faults, 2);
    assert_eq!(stats.tasks_executed, 3);
    assert_eq!(stats.workers_spawned, 1);
    assert_eq!(rt.lock_info(r).unwrap().holder, None);
}

#[test]
fn test_fault_log_keeps_only_the_latest() {
    init_tracing();
    let rt = Runtime::new(
        RuntimeConfig::default()
            .with_start_suspended(true)
            .with_fault_log_limit(2),
    );
    for i in 1..=4 {
        rt.submit_at(i as f64, move |_| Err(KernelError::fault(format!("f{}", i))))
            .unwrap();
    }
    run(&rt);

    let faults = rt.faults();
    assert_eq!(faults.len(), 2);
    assert!(faults[0].message.contains("f3"));
    assert!(faults[1].message.contains("f4"));
    assert_eq!(faults[1].time.value(), 4.0);
    assert_eq!(rt.stats().faults, 4);
}

#[test]
fn test_blocking_after_finish_is_misuse() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();
    let r = ResourceId::new(1);
    let l = Arc::clone(&log);
    rt.submit_at(0.0, move |cx| {
        cx.finish();
        let sleep = cx.sleep_for(1.0);
        let lock = cx.lock(r);
        let wait = cx.wait(r);
        l.lock().push(format!(
            "{} {} {}",
            matches!(sleep, Err(KernelError::Misuse(_))),
            matches!(lock, Err(KernelError::Misuse(_))),
            matches!(wait, Err(KernelError::Misuse(_))),
        ));
        // Non-blocking calls are still fine.
        l.lock().push(format!("notify={}", cx.notify(r)));
        Ok(())
    })
    .unwrap();

    run(&rt);
    assert_eq!(entries(&log), vec!["true true true", "notify=0"]);
    assert_eq!(rt.stats().faults, 0);
    assert_eq!(rt.now(), 0.0);
}

// ── Cancellation of tasks ─────────────────────────────────────────────

#[test]
fn test_cancel_pending_tasks() {
    let rt = staged(QueueBackend::Tree);
    let log = Log::default();

    let push = |log: &Log, name: &'static str| {
        let l = Arc::clone(log);
        move |_: &crate::worker::TaskContext| {
            l.lock().push(name.into());
            Ok::<(), KernelError>(())
        }
    };

    let h4 = rt.submit_at(4.0, push(&log, "4")).unwrap();
    let l = Arc::clone(&log);
    let h1 = rt
        .submit_at(1.0, move |cx| {
            l.lock().push(format!("1 cancelled 4: {}", cx.cancel(h4)));
            Ok(())
        })
        .unwrap();
    let h2 = rt.submit_at(2.0, push(&log, "2")).unwrap();
    rt.submit_at(3.0, push(&log, "3")).unwrap();

    assert!(rt.cancel(h2));
    assert!(!rt.cancel(h2));

    run(&rt);
    assert_eq!(entries(&log), vec!["1 cancelled 4: true", "3"]);
    assert!(!rt.cancel(h1));
    assert_eq!(rt.now(), 3.0);
}

// ── Workers ───────────────────────────────────────────────────────────

#[test]
fn test_workers_are_recycled() {
    let rt = staged(QueueBackend::Tree);
    for i in 0..50 {
        rt.submit_at(i as f64, |_| Ok(())).unwrap();
    }
    run(&rt);
    assert_eq!(rt.stats().workers_spawned, 1);
    let workers = rt.workers();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].state, WorkerState::Inactive);

    // Two overlapping sleepers need two threads; later work reuses them.
    rt.stop(false).unwrap();
    for t in [60.0, 60.0, 70.0, 80.0] {
        rt.submit_at(t, |cx| cx.sleep_for(5.0)).unwrap();
    }
    run(&rt);
    assert_eq!(rt.stats().workers_spawned, 2);
    assert_eq!(rt.stats().idle_workers, 2);
}

#[test]
fn test_cancelled_worker_releases_its_thread() {
    init_tracing();
    let rt = Runtime::with_defaults();
    rt.submit_at(1.0, |_| Err(KernelError::Cancelled)).unwrap();
    rt.wait_quiescent(SETTLE).unwrap();

    let deadline = Instant::now() + SETTLE;
    while rt.shared.core.lock().live_workers > 0 {
        assert!(Instant::now() < deadline, "worker never retired");
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(rt.shared.threads.lock().is_empty());
    assert!(rt.workers().is_empty());

    let log = Log::default();
    let l = Arc::clone(&log);
    rt.submit_at(2.0, move |cx| {
        l.lock().push(cx.worker_id().to_string());
        Ok(())
    })
    .unwrap();
    rt.wait_quiescent(SETTLE).unwrap();
    assert_eq!(entries(&log), vec!["W1"]);
    assert_eq!(rt.stats().workers_spawned, 2);
}

#[test]
fn test_worker_threads_are_named() {
    init_tracing();
    let rt = Runtime::new(RuntimeConfig::default().with_name("sim"));
    let log = Log::default();
    let l = Arc::clone(&log);
    rt.submit_at(0.0, move |_| {
        let name = std::thread::current().name().unwrap_or_default().to_string();
        l.lock().push(name);
        Ok(())
    })
    .unwrap();
    rt.wait_quiescent(SETTLE).unwrap();
    assert_eq!(entries(&log), vec!["sim-worker-0"]);
}

#[test]
fn test_info_and_worker_snapshots() {
    let rt = staged(QueueBackend::Tree);
    let r = ResourceId::new(8);
    rt.submit_at(1.0, move |cx| {
        cx.lock(r)?;
        cx.sleep_until(40.0)?;
        Ok(())
    })
    .unwrap();
    rt.submit_at(2.0, move |cx| cx.lock(r)).unwrap();
    rt.submit_at(30.0, |cx| {
        cx.stop();
        Ok(())
    })
    .unwrap();
    run(&rt);

    let workers = rt.workers();
    assert_eq!(workers.len(), 3);
    assert_eq!(workers[2].state, WorkerState::Inactive);
    assert_eq!(workers[0].state, WorkerState::Sleeping);
    assert_eq!(workers[0].wakeup_time.map(|t| t.value()), Some(40.0));
    assert_eq!(workers[1].state, WorkerState::Locking);
    assert_eq!(workers[1].sleep_target, Some(r));
    assert_eq!(
        rt.lock_info(r).unwrap().to_string(),
        "R8: held by W0 x1, 1 requester(s), 0 waiter(s)"
    );

    let info = rt.info();
    assert!(info.starts_with("Suspended T=30"));
    assert!(info.contains("busy=2"));
    assert_eq!(info, rt.stats().to_string());
}
