//! Stop signal shared by every background task of one player.

use tokio::sync::watch;

#[derive(Debug)]
pub(crate) struct Lifecycle {
    tx: watch::Sender<bool>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub(crate) fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Resolves once the owner signalled a stop or was dropped.
pub(crate) async fn stopped(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
