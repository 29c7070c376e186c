//! Dispatcher placement: inherited, explicit, main-thread and unconfined
//! execution contexts.

#[macro_use]
mod common;

use common::*;
use coscope::runtime::Executor;
use coscope::time::sleep;
use coscope::{Dispatcher, ErrorKind, EventLoop, RuntimeBuilder, TaskState};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn thread_name() -> Option<String> {
    thread::current().name().map(str::to_owned)
}

#[test]
fn explicit_dispatchers_pick_their_pools() {
    init_test_logging();
    test_phase!("explicit_dispatchers_pick_their_pools");
    let rt = test_runtime();
    let (on_default, on_io) = rt
        .run_blocking(|cx| async move {
            let cpu = cx
                .task()
                .dispatcher(Dispatcher::Default)
                .spawn(|_cx| async { Ok(thread_name()) });
            let io = cx
                .task()
                .dispatcher(Dispatcher::Io)
                .spawn(|_cx| async { Ok(thread_name()) });
            Ok((cpu.into_value().await?, io.into_value().await?))
        })
        .expect("both ran");
    assert!(on_default.is_some_and(|n| n.starts_with("coscope-it-default")));
    assert!(on_io.is_some_and(|n| n.starts_with("coscope-it-io")));
    test_complete!("explicit_dispatchers_pick_their_pools");
}

#[test]
fn with_dispatcher_switches_and_returns() {
    init_test_logging();
    let rt = test_runtime();
    let (inside, after) = rt
        .run_blocking_on(Dispatcher::Default, |cx| async move {
            let inside = cx
                .with_dispatcher(Dispatcher::Io, |_cx| async {
                    sleep(Duration::from_millis(5)).await;
                    Ok(thread_name())
                })
                .await?;
            Ok((inside, thread_name()))
        })
        .expect("switched");
    assert!(inside.is_some_and(|n| n.starts_with("coscope-it-io")));
    assert!(after.is_some_and(|n| n.starts_with("coscope-it-default")));
}

#[test]
fn main_dispatcher_runs_on_host_loop() {
    init_test_logging();
    let main_loop = Arc::new(EventLoop::new("host-main"));
    let rt = RuntimeBuilder::new()
        .default_threads(2)
        .io_threads(2)
        .thread_name_prefix("coscope-main-it")
        .main_executor(Arc::clone(&main_loop) as Arc<dyn Executor>)
        .build()
        .expect("runtime");

    let host = thread::current().id();
    let job = rt
        .global_scope()
        .task()
        .dispatcher(Dispatcher::Main)
        .spawn(|cx| async move {
            let worker = cx
                .with_dispatcher(Dispatcher::Default, |_cx| async { Ok(thread::current().id()) })
                .await?;
            Ok((worker, thread::current().id()))
        });

    let done = job.job().clone();
    main_loop.run_until(|| done.state().is_terminal());
    let (worker, resumed_on) = job.try_value().copied().expect("main task value");
    assert_ne!(worker, host);
    assert_eq!(resumed_on, host);
    assert_eq!(job.state(), TaskState::Completed);
}

#[test]
fn main_dispatcher_without_executor_fails() {
    init_test_logging();
    let rt = test_runtime();
    let err = rt
        .run_blocking(|cx| async move {
            cx.task()
                .dispatcher(Dispatcher::Main)
                .spawn(|_cx| async { Ok(()) })
                .into_value()
                .await
        })
        .expect_err("no main executor");
    assert_eq!(err.kind(), ErrorKind::MainDispatcherUnavailable);
}

#[test]
fn single_thread_dispatcher_keeps_affinity() {
    init_test_logging();
    let rt = test_runtime();
    let confined = Dispatcher::single_thread("coscope-confined");
    let names = rt
        .run_blocking(move |cx| async move {
            cx.task()
                .dispatcher(confined)
                .spawn(|_cx| async {
                    let before = thread_name();
                    sleep(Duration::from_millis(5)).await;
                    Ok((before, thread_name()))
                })
                .into_value()
                .await
        })
        .expect("ran");
    assert_eq!(names.0.as_deref(), Some("coscope-confined"));
    assert_eq!(names.1.as_deref(), Some("coscope-confined"));
}

#[test]
fn unconfined_resumes_on_waking_thread() {
    init_test_logging();
    let rt = test_runtime();
    let (started, resumed) = rt
        .run_blocking_on(Dispatcher::Io, |cx| async move {
            cx.task()
                .dispatcher(Dispatcher::Unconfined)
                .spawn(|_cx| async {
                    let started = thread_name();
                    sleep(Duration::from_millis(5)).await;
                    Ok((started, thread_name()))
                })
                .into_value()
                .await
        })
        .expect("ran");
    assert!(started.is_some_and(|n| n.starts_with("coscope-it-io")));
    assert_eq!(resumed.as_deref(), Some("coscope-timer"));
}

#[test]
fn io_tasks_launched_back_to_back_run_side_by_side() {
    init_test_logging();
    test_phase!("io_tasks_launched_back_to_back_run_side_by_side");
    let rt = test_runtime();
    let received = rt
        .run_blocking(|cx| async move {
            let (tx, rx) = std::sync::mpsc::channel::<()>();
            let waiter = cx
                .task()
                .dispatcher(Dispatcher::Io)
                .spawn(move |_cx| async move {
                    Ok(rx.recv_timeout(Duration::from_secs(2)).is_ok())
                });
            let sender = cx
                .task()
                .dispatcher(Dispatcher::Io)
                .spawn(move |_cx| async move {
                    let _ = tx.send(());
                    Ok(())
                });
            sender.into_value().await?;
            waiter.into_value().await
        })
        .expect("both ran");
    assert_with_log!(received, "blocked io task saw its sibling's message", true, received);
    test_complete!("io_tasks_launched_back_to_back_run_side_by_side");
}
