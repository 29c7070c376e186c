//! End-to-end cancellation: cooperative checkpoints, reasons, timeouts and
//! propagation to descendants.

#[macro_use]
mod common;

use common::*;
use coscope::time::{sleep, yield_now};
use coscope::{CancelKind, CancelReason, Dispatcher, ErrorKind, Outcome, TaskState};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

#[test]
fn checkpoint_loop_stops_on_cancel() {
    init_test_logging();
    test_phase!("checkpoint_loop_stops_on_cancel");
    let rt = test_runtime();
    let iterations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&iterations);

    let job = rt.global_scope().launch_on(Dispatcher::Default, move |cx| async move {
        loop {
            cx.checkpoint()?;
            counter.fetch_add(1, Ordering::SeqCst);
            yield_now().await;
        }
    });

    std::thread::sleep(Duration::from_millis(50));
    job.cancel_with(CancelReason::user("enough"));
    assert!(job.wait_blocking(Some(Duration::from_secs(5))));

    assert_eq!(job.state(), TaskState::Cancelled);
    match job.outcome() {
        Some(Outcome::Cancelled(reason)) => assert_eq!(reason.kind(), CancelKind::User),
        other => panic!("expected cancelled outcome, got {other:?}"),
    }
    let seen = iterations.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(iterations.load(Ordering::SeqCst), seen, "loop kept running");
    test_complete!("checkpoint_loop_stops_on_cancel");
}

#[test]
fn cancel_reaches_grandchildren() {
    init_test_logging();
    let rt = test_runtime();
    let (tx, rx) = mpsc::channel();

    let parent = rt.global_scope().launch(move |cx| async move {
        let grandchild_tx = tx.clone();
        let child = cx.launch(move |cx| async move {
            let grandchild = cx.launch(|_cx| async {
                sleep(Duration::from_secs(30)).await;
                Ok(())
            });
            grandchild_tx.send(grandchild).expect("receiver alive");
            sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        tx.send(child).expect("receiver alive");
        sleep(Duration::from_secs(30)).await;
        Ok(())
    });

    let child = rx.recv_timeout(Duration::from_secs(5)).expect("child handle");
    let grandchild = rx.recv_timeout(Duration::from_secs(5)).expect("grandchild handle");
    let ((), elapsed) = timed(|| {
        parent.cancel();
        assert!(parent.wait_blocking(Some(Duration::from_secs(5))));
    });

    assert!(elapsed < Duration::from_secs(5));
    assert_eq!(parent.state(), TaskState::Cancelled);
    assert_eq!(child.state(), TaskState::Cancelled);
    assert_eq!(grandchild.state(), TaskState::Cancelled);
}

#[test]
fn cancel_and_join_waits_for_cleanup() {
    init_test_logging();
    let rt = test_runtime();
    let cleaned = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cleaned);

    let state = rt
        .run_blocking(move |cx| async move {
            let job = cx.launch(move |_cx| async move {
                struct Cleanup(Arc<AtomicBool>);
                impl Drop for Cleanup {
                    fn drop(&mut self) {
                        self.0.store(true, Ordering::SeqCst);
                    }
                }
                let _cleanup = Cleanup(flag);
                sleep(Duration::from_secs(30)).await;
                Ok(())
            });
            sleep(Duration::from_millis(20)).await;
            Ok(job.cancel_and_join().await)
        })
        .expect("root completed");

    assert_eq!(state, TaskState::Cancelled);
    assert!(cleaned.load(Ordering::SeqCst));
}

#[test]
fn with_timeout_cancels_overrunning_body() {
    init_test_logging();
    let rt = test_runtime();
    let (result, elapsed) = timed(|| {
        rt.run_blocking(|cx| async move {
            cx.with_timeout(Duration::from_millis(100), |cx| async move {
                cx.launch(|_cx| async {
                    sleep(Duration::from_secs(30)).await;
                    Ok(())
                });
                sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
        })
    });

    let err = result.expect_err("timed out");
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(elapsed < Duration::from_secs(5));
}

#[test]
fn cancelled_root_reports_cancelled() {
    init_test_logging();
    let rt = test_runtime();
    let err = rt
        .run_blocking(|cx| async move {
            cx.with_scope(|cx| async move {
                cx.scope().cancel(CancelReason::user("stop early"));
                cx.checkpoint()?;
                Ok(())
            })
            .await
        })
        .expect_err("scope was cancelled");
    assert!(err.is_cancelled());
}
