use std::sync::Arc;

use tokio::sync::watch;

/// Cooperative stop flag shared by the tasks of a poller
#[derive(Clone)]
pub(crate) struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes a [`StopSignal`]
#[derive(Clone)]
pub(crate) struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl StopListener {
    pub(crate) fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// resolves once the flag is set
    pub(crate) async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
