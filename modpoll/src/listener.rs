use std::sync::Arc;

use crate::common::frame::Frame;
use crate::maybe_async::MaybeAsync;

/// A generic listener type that can be invoked multiple times
pub trait Listener<T>: Send {
    /// inform the listener that the value has changed
    fn update(&mut self, _value: T) -> MaybeAsync<()> {
        MaybeAsync::ready(())
    }
}

/// Listener that does nothing
#[derive(Copy, Clone)]
pub struct NullListener;

impl NullListener {
    /// create a `Box<dyn Listener<T>>` that does nothing
    pub fn create<T>() -> Box<dyn Listener<T>> {
        Box::new(NullListener)
    }
}

impl<T> Listener<T> for NullListener {
    fn update(&mut self, _value: T) -> MaybeAsync<()> {
        MaybeAsync::ready(())
    }
}

/// Diagnostic events produced by a running poller
#[derive(Clone, Debug, PartialEq)]
pub enum PollEvent {
    /// a frame was written to the transport
    FrameSent(Frame),
    /// a frame was assembled from the inbound byte stream, before any validation
    FrameReceived(Frame),
    /// the transport failed and polling stopped
    TransportError(String),
    /// the poller changed state
    StateChanged(PollState),
}

/// State of a poller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PollState {
    /// requests are being sent
    Running,
    /// polling has ended, either on request or because the transport failed
    Stopped,
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PollState::Running => f.write_str("running"),
            PollState::Stopped => f.write_str("stopped"),
        }
    }
}

/// shared by every task of a poller
#[derive(Clone)]
pub(crate) struct EventSink {
    listener: Arc<parking_lot::Mutex<Box<dyn Listener<PollEvent>>>>,
}

impl EventSink {
    pub(crate) fn new(listener: Box<dyn Listener<PollEvent>>) -> Self {
        Self {
            listener: Arc::new(parking_lot::Mutex::new(listener)),
        }
    }

    pub(crate) async fn emit(&self, event: PollEvent) {
        // the lock is released before awaiting the listener's future
        let result = self.listener.lock().update(event);
        result.get().await
    }
}
