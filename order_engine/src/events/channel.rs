//! Simple stateless pub-sub event handler
//!
//! Components that care about what the engine does (search indexing, notifications, analytics) subscribe a handler.
//! Handlers only receive the event itself and have no access to the engine's state. They can be async.
//!
//! Publishing never waits. The engine publishes after a storage transaction has committed, and a slow or full
//! subscriber must not hold up the caller that triggered the event.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use log::*;
use tokio::sync::mpsc::{self, error::TrySendError};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped and all in-flight handler jobs have finished.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Once the last producer goes away, recv() returns None and the handler shuts down.
        drop(self.sender);
        let jobs = Arc::new(AtomicI64::new(0));
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            jobs.fetch_add(1, Ordering::SeqCst);
            let job = jobs.clone();
            tokio::spawn(async move {
                (handler)(ev).await;
                job.fetch_sub(1, Ordering::SeqCst);
                trace!("📬️ Event handled");
            });
        }
        while jobs.load(Ordering::SeqCst) > 0 {
            debug!("📬️ Waiting for {} event jobs to complete", jobs.load(Ordering::SeqCst));
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync + 'static> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Hands the event to the subscriber without waiting. If the subscriber's buffer is full, delivery is moved to a
    /// background task. Must be called from within a tokio runtime.
    pub fn publish_event(&self, event: E) {
        match self.sender.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(event)) => {
                trace!("📬️ Subscriber buffer is full. Delivering in the background");
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    if sender.send(event).await.is_err() {
                        warn!("📬️ Subscriber went away before a queued event could be delivered");
                    }
                });
            },
            Err(TrySendError::Closed(_)) => {
                warn!("📬️ Event dropped. The subscriber has shut down");
            },
        }
    }
}
