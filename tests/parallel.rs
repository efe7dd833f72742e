use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use asyncstep::{
    Abandoned, CancellationFlag, ParallelResults, ParallelTasks, RegistryError, Runner, Timeout,
};

fn runner() -> Runner {
    Runner::builder()
        .pool_size(8)
        .name_prefix("parallel-test-")
        .build()
        .unwrap()
}

// Blocks the calling thread until the flag is raised, giving up after five seconds.
fn wait_for_cancel(flag: &CancellationFlag) -> bool {
    for _ in 0..1000 {
        if flag.is_cancelled() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn parallel_collects_every_result() {
    let mut tasks = ParallelTasks::<usize, String>::new();
    for i in 0..10 {
        tasks.add_task(format!("task-{i}"), move |done| {
            thread::sleep(Duration::from_millis(10 * (i as u64 % 3)));
            done.ok(i * i);
        });
    }

    let results = runner()
        .parallel(tasks, Timeout::from_secs_f64(5.0))
        .await
        .unwrap();

    assert!(!results.has_timed_out(), "Run should not time out");
    assert!(results.errors().is_empty(), "No task failed");
    assert_eq!(results.identifiers().len(), 10);
    for i in 0..10 {
        assert_eq!(
            results.result_for_identifier(&format!("task-{i}")),
            Some(&(i * i)),
            "Every task should have its result"
        );
    }
    assert_eq!(
        results.identifiers()[0],
        "task-0",
        "Identifiers keep registration order"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_on_failure_finalizes_early() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_cl = Arc::clone(&calls);
    let slow_saw_cancel = Arc::new(AtomicBool::new(false));
    let slow_saw_cancel_cl = Arc::clone(&slow_saw_cancel);
    let (late_sender, late_receiver) = mpsc::channel();
    let (sender, receiver) = mpsc::channel();

    let mut tasks = ParallelTasks::<u32, &'static str>::new();
    tasks
        .add_task_stop_on_failure(
            "critical",
            |done| {
                thread::sleep(Duration::from_millis(20));
                done.err("critical failed");
            },
            true,
        )
        .add_task("slow", move |done| {
            let flag = done.cancellation();
            thread::spawn(move || {
                slow_saw_cancel_cl.store(wait_for_cancel(&flag), Ordering::SeqCst);
                done.ok(7);
                let _ = late_sender.send(());
            });
        });

    runner().run_parallel(tasks, Timeout::none(), move |results| {
        calls_cl.fetch_add(1, Ordering::SeqCst);
        let _ = sender.send(results);
    });

    let results = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(!results.has_timed_out());
    assert_eq!(results.error_for_identifier("critical"), Some(&"critical failed"));
    assert_eq!(results.result_for_identifier("critical"), None);
    assert_eq!(
        results.result_for_identifier("slow"),
        None,
        "Slow task had not reported when the run stopped"
    );
    assert_eq!(results.unfinished().collect::<Vec<_>>(), ["slow"]);

    late_receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(slow_saw_cancel.load(Ordering::SeqCst), "Slow task should see cancellation");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Late report must not finalize again");
    assert_eq!(
        results.result_for_identifier("slow"),
        None,
        "Delivered snapshot must not change"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_without_stop_lets_the_run_finish() {
    let finished_last = Arc::new(AtomicBool::new(false));
    let finished_last_cl = Arc::clone(&finished_last);

    let mut tasks = ParallelTasks::<u32, String>::new();
    tasks
        .add_task("failing", |done| done.err("not fatal".to_string()))
        .add_task("quick", |done| done.ok(1))
        .add_task("slow", move |done| {
            thread::sleep(Duration::from_millis(100));
            finished_last_cl.store(true, Ordering::SeqCst);
            done.ok(2);
        });

    let results = runner().parallel(tasks, Timeout::none()).await.unwrap();

    assert!(finished_last.load(Ordering::SeqCst), "Run should wait for every task");
    assert!(!results.has_timed_out());
    assert_eq!(results.errors().len(), 1);
    assert_eq!(results.error_for_identifier("failing"), Some(&"not fatal".to_string()));
    assert_eq!(results.result_for_identifier("failing"), None);
    assert_eq!(results.result_for_identifier("quick"), Some(&1));
    assert_eq!(results.result_for_identifier("slow"), Some(&2));
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_keeps_what_finished_in_time() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_cl = Arc::clone(&calls);
    let (late_sender, late_receiver) = mpsc::channel();
    let (sender, receiver) = mpsc::channel();

    let mut tasks = ParallelTasks::<u32, ()>::new();
    tasks
        .add_task("fast", |done| done.ok(1))
        .add_task("stuck", move |done| {
            let flag = done.cancellation();
            thread::spawn(move || {
                wait_for_cancel(&flag);
                done.ok(2);
                let _ = late_sender.send(());
            });
        });

    runner().run_parallel(tasks, Duration::from_millis(100), move |results| {
        calls_cl.fetch_add(1, Ordering::SeqCst);
        let _ = sender.send(results);
    });

    let results: ParallelResults<u32, ()> = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(results.has_timed_out(), "Run should report the timeout");
    assert_eq!(results.result_for_identifier("fast"), Some(&1));
    assert_eq!(results.result_for_identifier("stuck"), None);
    assert!(
        results.errors().is_empty(),
        "No error is made up for unfinished tasks"
    );
    assert_eq!(results.identifiers(), ["fast", "stuck"]);

    late_receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_before_any_task_reports() {
    let mut tasks = ParallelTasks::<u32, ()>::new();
    for id in ["a", "b", "c"] {
        tasks.add_task(id, |done| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(300));
                done.ok(0);
            });
        });
    }

    let results = runner()
        .parallel(tasks, Duration::from_millis(30))
        .await
        .unwrap();
    assert!(results.has_timed_out());
    assert_eq!(results.unfinished().count(), 3);
    assert!(results.into_results().is_empty());
}

#[test]
fn empty_registry_completes_immediately() {
    let result = Arc::new(Mutex::new(None));
    let result_cl = Arc::clone(&result);

    runner().run_parallel(
        ParallelTasks::<u32, ()>::new(),
        Timeout::from_secs_f64(1.0),
        move |results| {
            *result_cl.lock().unwrap() = Some(results);
        },
    );

    let results = result.lock().unwrap().take().expect("Completion should have run inline");
    assert!(results.identifiers().is_empty());
    assert!(!results.has_timed_out());
}

#[tokio::test(flavor = "multi_thread")]
async fn re_adding_an_identifier_replaces_the_task() {
    let mut tasks = ParallelTasks::<&'static str, ()>::new();
    tasks
        .add_task("job", |done| done.ok("first"))
        .add_task("other", |done| done.ok("other"))
        .add_task_stop_on_failure("job", |done| done.ok("second"), true);

    assert!(tasks.task_for_identifier("job").is_ok());
    assert_eq!(tasks.stops_on_failure("job"), Ok(true));
    assert_eq!(
        tasks.task_for_identifier("missing").err(),
        Some(RegistryError::UnknownIdentifier("missing".to_string()))
    );
    assert_eq!(tasks.identifiers(), ["job", "other"]);

    let results = runner().parallel(tasks, Timeout::none()).await.unwrap();
    assert_eq!(results.result_for_identifier("job"), Some(&"second"));
}

#[tokio::test(flavor = "multi_thread")]
async fn dropped_completion_without_timeout_abandons_the_run() {
    let mut tasks = ParallelTasks::<u32, ()>::new();
    tasks
        .add_task("reports", |done| done.ok(1))
        .add_task("forgets", |done| drop(done));

    let r = runner().parallel(tasks, Timeout::none()).await;
    assert_eq!(r.err(), Some(Abandoned));
}

#[test]
fn parallel_runs_on_any_executor() {
    let mut tasks = ParallelTasks::<u32, ()>::new();
    tasks.add_task("one", |done| done.ok(1)).add_task("two", |done| done.ok(2));

    let results = smol::block_on(Runner::global().parallel(tasks, Timeout::none())).unwrap();
    assert_eq!(results.result_for_identifier("one"), Some(&1));
    assert_eq!(results.result_for_identifier("two"), Some(&2));
}

#[tokio::test(flavor = "multi_thread")]
async fn timeouts_beyond_the_clock_run_unbounded() {
    for timeout in [Timeout::from_secs_f64(1e20), Timeout::from(Duration::MAX)] {
        let mut tasks = ParallelTasks::<u32, ()>::new();
        tasks.add_task("a", |done| done.ok(1)).add_task("b", |done| done.ok(2));

        let results = runner().parallel(tasks, timeout).await.unwrap();
        assert!(!results.has_timed_out());
        assert_eq!(results.result_for_identifier("a"), Some(&1));
        assert_eq!(results.result_for_identifier("b"), Some(&2));
    }
}
