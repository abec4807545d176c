use {
    std::time::Duration,
    tokio::{sync::mpsc, task::JoinHandle},
};

/// Fired onto the controller's queue when a reconnect timer elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectDue(pub u64);

/// Cancellable handle to one scheduled reconnect
#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

/// Schedules reconnect timers that post `ReconnectDue` onto a channel
pub struct ReconnectScheduler {
    tx: mpsc::UnboundedSender<ReconnectDue>,
    next_id: u64,
}

impl ReconnectScheduler {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ReconnectDue>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, next_id: 0 }, rx)
    }

    pub fn schedule(&mut self, delay: Duration) -> TimerHandle {
        self.next_id += 1;
        let id = self.next_id;
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the controller stopped
            let _ = tx.send(ReconnectDue(id));
        });

        TimerHandle { id, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (mut scheduler, mut rx) = ReconnectScheduler::channel();
        let handle = scheduler.schedule(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.try_recv().unwrap(), ReconnectDue(handle.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (mut scheduler, mut rx) = ReconnectScheduler::channel();
        let first = scheduler.schedule(Duration::from_secs(60));
        first.cancel();
        let second = scheduler.schedule(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(rx.try_recv().unwrap(), ReconnectDue(second.id()));
        assert!(rx.try_recv().is_err());
    }
}
