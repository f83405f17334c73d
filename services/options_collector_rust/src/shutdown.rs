//! Cooperative shutdown shared by the scheduler and the fetcher.
//!
//! Triggering is sticky: once set, every current and future signal clone
//! observes it. Dropping the handle without triggering does not count as
//! shutdown.

use std::sync::Arc;
use tokio::sync::watch;

pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx: Arc::new(tx) }, ShutdownSignal { rx })
}

#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // handle dropped untriggered
                std::future::pending::<()>().await;
            }
        }
    }
}
