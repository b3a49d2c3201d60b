//! Hand-off queue between extraction workers and the consumer
//!
//! A bounded channel owned by one pipeline run. Offers wait a bounded time
//! for space and give the item up when none frees.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::SendTimeoutError};

/// Create a bounded hand-off queue
pub fn handoff_queue<T>(
    capacity: usize,
    timeout: Duration,
) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (HandoffSender { tx, timeout }, HandoffReceiver { rx })
}

/// Producer side, one clone per worker
#[derive(Debug)]
pub struct HandoffSender<T> {
    tx: mpsc::Sender<T>,
    timeout: Duration,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            timeout: self.timeout,
        }
    }
}

impl<T> HandoffSender<T> {
    /// Offer an item; `false` means it was dropped
    pub async fn offer(&self, item: T) -> bool {
        match self.tx.send_timeout(item, self.timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) | Err(SendTimeoutError::Closed(_)) => false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer side
#[derive(Debug)]
pub struct HandoffReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> HandoffReceiver<T> {
    /// Next item; `None` once every sender is gone and the queue is empty
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
