use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::common::frame::Frame;
use crate::device::plan::PlanLimits;
use crate::device::Device;
use crate::poll::gate::PollGate;
use crate::poll::stop::StopListener;

/// Sends the planned requests of every enabled device, one at a time
pub(crate) struct Scheduler {
    pub(crate) devices: Arc<Mutex<Vec<Device>>>,
    pub(crate) gate: PollGate,
    pub(crate) outbound: mpsc::Sender<Frame>,
    pub(crate) response_timeout: Duration,
    pub(crate) inter_frame_delay: Duration,
    pub(crate) limits: PlanLimits,
    pub(crate) stop: StopListener,
}

enum Exit {
    Stopped,
    WriterClosed,
}

impl Scheduler {
    pub(crate) async fn run(mut self) {
        match self.poll_forever().await {
            Exit::Stopped => tracing::info!("scheduler stopped"),
            Exit::WriterClosed => tracing::info!("scheduler exiting, the write task has ended"),
        }
    }

    async fn poll_forever(&mut self) -> Exit {
        loop {
            if self.stop.is_stopped() {
                return Exit::Stopped;
            }

            // changes to the device list apply on the next pass
            let devices: Vec<Device> = self
                .devices
                .lock()
                .iter()
                .filter(|d| d.is_enabled())
                .cloned()
                .collect();

            let mut sent = 0usize;
            for device in devices {
                let plan = device.request_plan(self.limits);
                for request in plan.iter() {
                    let completed = tokio::select! {
                        _ = self.stop.stopped() => return Exit::Stopped,
                        completed = self.gate.wait(self.response_timeout) => completed,
                    };

                    if !completed {
                        if let Some(previous) = self.gate.current() {
                            tracing::warn!(
                                "no response from device {} within {} ms: {}",
                                previous.device.name(),
                                self.response_timeout.as_millis(),
                                previous.request
                            );
                        }
                    }

                    self.gate.begin(device.clone(), request.clone());

                    if self.outbound.send(request.frame.clone()).await.is_err() {
                        return Exit::WriterClosed;
                    }
                    sent += 1;
                }
            }

            if sent == 0 {
                tokio::select! {
                    _ = self.stop.stopped() => return Exit::Stopped,
                    _ = tokio::time::sleep(self.inter_frame_delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MeasurementPoint;
    use crate::poll::stop::StopSignal;
    use crate::types::{RegisterBank, UnitId, ValueType};

    const TIMEOUT: Duration = Duration::from_millis(1000);

    fn scheduler(devices: Vec<Device>) -> (Scheduler, mpsc::Receiver<Frame>, StopSignal) {
        let (gate, _observer) = PollGate::create();
        let (tx, rx) = mpsc::channel(16);
        let stop = StopSignal::new();
        let scheduler = Scheduler {
            devices: Arc::new(Mutex::new(devices)),
            gate,
            outbound: tx,
            response_timeout: TIMEOUT,
            inter_frame_delay: Duration::from_millis(50),
            limits: PlanLimits::default(),
            stop: stop.listener(),
        };
        (scheduler, rx, stop)
    }

    fn device_with_two_requests() -> Device {
        let device = Device::new("meter", UnitId::new(1));
        device.add_point(
            MeasurementPoint::new("a", 0, RegisterBank::Holding, ValueType::U16).unwrap(),
        );
        device.add_point(
            MeasurementPoint::new("b", 0, RegisterBank::Input, ValueType::U16).unwrap(),
        );
        device
    }

    #[tokio::test(start_paused = true)]
    async fn sends_every_request_in_order_when_no_response_arrives() {
        let device = device_with_two_requests();
        let plan = device.request_plan(PlanLimits::default());
        let (scheduler, mut rx, stop) = scheduler(vec![device]);
        let task = tokio::spawn(scheduler.run());

        let start = tokio::time::Instant::now();
        let first = rx.recv().await.unwrap();
        assert_eq!(first, plan.requests()[0].frame);
        assert_eq!(start.elapsed(), Duration::ZERO);

        let second = rx.recv().await.unwrap();
        assert_eq!(second, plan.requests()[1].frame);
        assert_eq!(start.elapsed(), TIMEOUT);

        // then the cycle starts over
        let third = rx.recv().await.unwrap();
        assert_eq!(third, plan.requests()[0].frame);
        assert_eq!(start.elapsed(), 2 * TIMEOUT);

        stop.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_devices_are_skipped() {
        let enabled = Device::new("enabled", UnitId::new(2));
        enabled.add_point(
            MeasurementPoint::new("a", 5, RegisterBank::Holding, ValueType::U16).unwrap(),
        );
        let disabled = device_with_two_requests();
        disabled.set_enabled(false);

        let (scheduler, mut rx, stop) = scheduler(vec![disabled, enabled]);
        let task = tokio::spawn(scheduler.run());

        for _ in 0..3 {
            let frame = rx.recv().await.unwrap();
            assert_eq!(frame.as_bytes()[0], 0x02);
        }

        stop.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn idles_without_spinning_when_nothing_is_planned() {
        let (scheduler, mut rx, stop) = scheduler(vec![Device::new("empty", UnitId::new(1))]);
        let task = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        stop.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn exits_when_the_writer_goes_away() {
        let (scheduler, rx, _stop) = scheduler(vec![device_with_two_requests()]);
        drop(rx);
        scheduler.run().await;
    }
}
