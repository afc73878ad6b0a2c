// Push-side view of a coordinator: one receiver per subscriber, woken on
// every publish.

use std::sync::Arc;

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::PollStatus;

/// Handle returned by [`Coordinator::subscribe`](crate::Coordinator::subscribe).
pub struct StatusStream {
    receiver: watch::Receiver<Arc<PollStatus>>,
}

impl StatusStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<PollStatus>>) -> Self {
        Self { receiver }
    }

    /// Next status published after the last one seen here, or `None` once
    /// the coordinator is gone. Bursts between calls collapse to the newest.
    pub async fn changed(&mut self) -> Option<Arc<PollStatus>> {
        self.receiver.changed().await.ok()?;
        Some(Arc::clone(&self.receiver.borrow_and_update()))
    }

    /// Yields whatever is published right now, then each later publish.
    pub fn into_stream(self) -> impl Stream<Item = Arc<PollStatus>> + Send + Unpin {
        WatchStream::new(self.receiver)
    }
}
