//! Background tasks binding an [`EventHandler`] to an [`Inbox`].

use std::sync::Arc;

use async_trait::async_trait;
use domain::OrderEvent;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use crate::Inbox;

/// Reacts to events delivered to one inbox.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Handles one event. An error is logged and counted; the subscriber
    /// carries on with the next event.
    async fn handle(&self, event: OrderEvent) -> Result<(), Self::Error>;

    /// Runs once after the inbox has been drained on shutdown.
    async fn on_shutdown(&self) {}
}

/// Control side of a running subscriber.
#[derive(Debug)]
pub struct SubscriberHandle {
    name: &'static str,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SubscriberHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the task to stop and waits for it to drain its inbox and run
    /// the handler's shutdown hook.
    pub async fn stop(self) -> Result<(), JoinError> {
        // The task may already have exited on its own.
        let _ = self.stop.send(true);
        self.task.await
    }

    /// Waits for the task to exit without signalling it, e.g. after the bus
    /// was closed.
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}

/// Spawns a task feeding every event of `inbox` to `handler`, in order.
///
/// The task exits when stopped through its handle or when the inbox is
/// closed. Either way, events already deposited are handled first and
/// [`EventHandler::on_shutdown`] runs last.
pub fn spawn_subscriber<H: EventHandler>(handler: Arc<H>, inbox: Inbox) -> SubscriberHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let name = handler.name();
    let task = tokio::spawn(run(handler, inbox, stop_rx));
    tracing::debug!(subscriber = name, "subscriber started");
    SubscriberHandle {
        name,
        stop: stop_tx,
        task,
    }
}

async fn run<H: EventHandler>(handler: Arc<H>, mut inbox: Inbox, mut stop: watch::Receiver<bool>) {
    let name = handler.name();
    let mut handled: u64 = 0;

    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    tracing::debug!(subscriber = name, "stop signal received");
                    break;
                }
            }
            event = inbox.recv() => match event {
                Some(event) => {
                    dispatch(handler.as_ref(), event).await;
                    handled += 1;
                }
                None => {
                    tracing::debug!(subscriber = name, "inbox closed");
                    break;
                }
            },
        }
    }

    let mut drained: u64 = 0;
    while let Some(event) = inbox.try_recv() {
        dispatch(handler.as_ref(), event).await;
        drained += 1;
    }

    handler.on_shutdown().await;
    tracing::info!(
        subscriber = name,
        handled = handled + drained,
        drained,
        dropped = inbox.dropped(),
        "subscriber stopped"
    );
}

async fn dispatch<H: EventHandler>(handler: &H, event: OrderEvent) {
    let kind = event.kind;
    let order_id = event.order_id;
    match handler.handle(event).await {
        Ok(()) => {
            metrics::counter!("subscriber_events_total", "subscriber" => handler.name())
                .increment(1);
        }
        Err(e) => {
            metrics::counter!("subscriber_errors_total", "subscriber" => handler.name())
                .increment(1);
            tracing::error!(
                subscriber = handler.name(),
                %kind,
                %order_id,
                error = %e,
                "event handler failed"
            );
        }
    }
}
