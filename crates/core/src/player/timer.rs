//! Named one-shot timers that post a message back into the player loop.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// A single cancellable timer. Arming it again replaces the pending shot and
/// dropping it cancels whatever is still pending.
pub(crate) struct Timer {
    name: &'static str,
    task: Option<JoinHandle<()>>,
}

impl Timer {
    pub(crate) fn new(name: &'static str) -> Self {
        Self { name, task: None }
    }

    /// Deliver `message` on `tx` after `after`, cancelling any earlier shot.
    pub(crate) fn arm<T: Send + 'static>(&mut self, after: Duration, tx: mpsc::Sender<T>, message: T) {
        self.cancel();
        trace!("arming {} timer for {:?}", self.name, after);
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(message).await;
        }));
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            trace!("cancelling {} timer", self.name);
            task.abort();
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_pending_shot() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timer = Timer::new("test");
        timer.arm(Duration::from_secs(5), tx.clone(), 1);
        timer.arm(Duration::from_secs(5), tx.clone(), 2);
        assert_eq!(rx.recv().await, Some(2));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels() {
        let (tx, mut rx) = mpsc::channel(4);
        {
            let mut timer = Timer::new("test");
            timer.arm(Duration::from_secs(1), tx, 1);
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
