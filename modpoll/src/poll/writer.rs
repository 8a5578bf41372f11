use std::time::Duration;

use crate::channel::Receiver;
use crate::common::frame::{Frame, FrameDisplay};
use crate::common::phys::PhysWriter;
use crate::decode::DecodeLevel;
use crate::error::TransportError;
use crate::listener::{EventSink, PollEvent};
use crate::poll::stop::StopListener;

/// Writes queued frames to the transport, one at a time
pub(crate) struct WriteTask {
    pub(crate) writer: PhysWriter,
    pub(crate) outbound: Receiver<Frame>,
    pub(crate) inter_frame_delay: Duration,
    pub(crate) decode: DecodeLevel,
    pub(crate) stop: StopListener,
    pub(crate) events: EventSink,
}

impl WriteTask {
    pub(crate) async fn run(mut self) -> Result<(), TransportError> {
        let result = self.write_frames().await;
        self.writer.shutdown().await;
        result
    }

    async fn write_frames(&mut self) -> Result<(), TransportError> {
        loop {
            let frame = tokio::select! {
                _ = self.stop.stopped() => return Ok(()),
                frame = self.outbound.recv() => match frame {
                    Ok(frame) => frame,
                    Err(_) => return Ok(()),
                },
            };

            if self.decode.frame.enabled() {
                tracing::info!(
                    "RTU TX - {}",
                    FrameDisplay::new(self.decode.frame, frame.as_bytes())
                );
            }

            self.writer
                .write(frame.as_bytes(), self.decode.physical)
                .await?;
            self.events.emit(PollEvent::FrameSent(frame)).await;

            tokio::time::sleep(self.inter_frame_delay).await;
        }
    }
}
