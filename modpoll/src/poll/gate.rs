use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::device::plan::ReadRequest;
use crate::device::Device;

/// The single request outstanding on a transport
#[derive(Debug)]
pub(crate) struct PollCycle {
    seq: u64,
    pub(crate) device: Device,
    pub(crate) request: ReadRequest,
}

/// Scheduler side of the gate
///
/// Every cycle gets a sequence number and the decoder publishes the number of the cycle it
/// completed. A wait only returns early for the completion of the outstanding cycle, and
/// only once per cycle. Before the first cycle the gate is open.
pub(crate) struct PollGate {
    next_seq: u64,
    released: Option<u64>,
    current: watch::Sender<Option<Arc<PollCycle>>>,
    completed: watch::Receiver<u64>,
}

/// Decoder side of the gate
pub(crate) struct CycleObserver {
    current: watch::Receiver<Option<Arc<PollCycle>>>,
    completed: watch::Sender<u64>,
}

impl PollGate {
    pub(crate) fn create() -> (Self, CycleObserver) {
        let (current_tx, current_rx) = watch::channel(None);
        let (completed_tx, completed_rx) = watch::channel(0);
        (
            Self {
                next_seq: 1,
                released: None,
                current: current_tx,
                completed: completed_rx,
            },
            CycleObserver {
                current: current_rx,
                completed: completed_tx,
            },
        )
    }

    /// wait for the outstanding cycle to complete, returning false if `timeout` elapses first
    pub(crate) async fn wait(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let target = self.current.borrow().as_ref().map_or(0, |cycle| cycle.seq);

        if self.released == Some(target) {
            tokio::time::sleep_until(deadline).await;
            return false;
        }

        let completed = match tokio::time::timeout_at(
            deadline,
            self.completed.wait_for(|done| *done >= target),
        )
        .await
        {
            Ok(Ok(_)) => Some(true),
            Err(_) => Some(false),
            // decoder is gone
            Ok(Err(_)) => None,
        };

        match completed {
            Some(true) => {
                self.released = Some(target);
                true
            }
            Some(false) => false,
            None => {
                tokio::time::sleep_until(deadline).await;
                false
            }
        }
    }

    /// record a new outstanding cycle, replacing the previous one
    pub(crate) fn begin(&mut self, device: Device, request: ReadRequest) -> Arc<PollCycle> {
        let cycle = Arc::new(PollCycle {
            seq: self.next_seq,
            device,
            request,
        });
        self.next_seq += 1;
        self.current.send_replace(Some(cycle.clone()));
        cycle
    }

    pub(crate) fn current(&self) -> Option<Arc<PollCycle>> {
        self.current.borrow().clone()
    }
}

impl CycleObserver {
    pub(crate) fn current(&self) -> Option<Arc<PollCycle>> {
        self.current.borrow().clone()
    }

    /// release the scheduler if `cycle` is still the outstanding one
    pub(crate) fn complete(&self, cycle: &Arc<PollCycle>) -> bool {
        let is_current = matches!(&*self.current.borrow(), Some(x) if x.seq == cycle.seq);
        if is_current {
            self.completed.send_replace(cycle.seq);
        }
        is_current
    }
}
