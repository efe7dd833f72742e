//! A future resolving to the terminal value of a run.
use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::channel::oneshot;
use pin_project_lite::pin_project;

pin_project! {
    /// Resolves once the run it was created for finalizes.
    ///
    /// Returned by [`Runner::sequence`](crate::Runner::sequence) and
    /// [`Runner::parallel`](crate::Runner::parallel). It does not drive the
    /// run; the run makes progress on the runner's pool whether or not this is
    /// polled, and dropping it does not cancel anything.
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct Outcome<R> {
        #[pin]
        receiver: oneshot::Receiver<R>,
        on_abandon: fn() -> R,
    }
}

impl<R> Outcome<R> {
    pub(crate) fn channel(on_abandon: fn() -> R) -> (Self, oneshot::Sender<R>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                receiver,
                on_abandon,
            },
            sender,
        )
    }
}

impl<R> Future for Outcome<R> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.receiver.poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(value),
            // The sender went away with the run without ever finalizing it.
            Poll::Ready(Err(oneshot::Canceled)) => {
                let on_abandon = *this.on_abandon;
                Poll::Ready(on_abandon())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
