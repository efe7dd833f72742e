use std::time::Duration;

use asyncstep::{Runner, Sequence, StepError, Timeout};
use tokio::time::sleep;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let handle = tokio::runtime::Handle::current();
    let (h1, h2) = (handle.clone(), handle.clone());

    // Each step gets the previous result and reports through `next`.
    let steps = Sequence::<String, String>::new()
        .then(move |_, _, next| {
            h1.spawn(async move {
                sleep(Duration::from_millis(200)).await;
                next.ok("fetched".into());
            });
        })
        .then(move |previous, _, next| {
            h2.spawn(async move {
                sleep(Duration::from_millis(200)).await;
                next.ok(format!("{} and parsed", previous.unwrap_or_default()));
            });
        });

    match Runner::global().sequence(steps, Timeout::from_secs_f64(2.0)).await {
        Ok(result) => println!("Sequence finished: {result:?}"),
        Err(e) => println!("Sequence failed: {e}"),
    }

    // This one does not have enough time. The step watches the flag and gives up.
    let slow = Sequence::<u32, String>::new().then(move |_, cancel, next| {
        handle.spawn(async move {
            while !cancel.is_cancelled() {
                sleep(Duration::from_millis(50)).await;
            }
            println!("Step saw cancellation, reporting anyway");
            next.err("gave up".into());
        });
    });

    match Runner::global().sequence(slow, Duration::from_millis(300)).await {
        Err(StepError::TimedOut(after)) => println!("Timed out after {after:?}"),
        other => println!("Unexpected outcome: {other:?}"),
    }
    sleep(Duration::from_millis(100)).await;
}
