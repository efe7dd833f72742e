use std::{thread, time::Duration};

use asyncstep::{ParallelTasks, run_parallel};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut tasks = ParallelTasks::<u64, String>::new();
    tasks
        .add_task("profile", |done| {
            thread::sleep(Duration::from_millis(100));
            done.ok(1);
        })
        .add_task("avatar", |done| done.err("not found".into()))
        .add_task_stop_on_failure(
            "session",
            |done| {
                thread::sleep(Duration::from_millis(300));
                done.ok(3);
            },
            true,
        );

    let (sender, receiver) = std::sync::mpsc::channel();
    // Not stopping on "avatar", so the run waits for every task.
    run_parallel(tasks, Duration::from_secs(1), move |results| {
        let _ = sender.send(results);
    });

    let results = receiver.recv().unwrap();
    println!("Timed out: {}", results.has_timed_out());
    for id in results.identifiers() {
        match (results.result_for_identifier(id), results.error_for_identifier(id)) {
            (Some(value), _) => println!("{id}: {value}"),
            (_, Some(error)) => println!("{id} failed: {error}"),
            _ => println!("{id}: did not finish"),
        }
    }
}
