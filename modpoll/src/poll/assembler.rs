use std::time::Duration;

use crate::common::frame::{Frame, FrameDisplay};
use crate::common::phys::PhysReader;
use crate::constants::frame::MAX_FRAME_LENGTH;
use crate::decode::DecodeLevel;
use crate::error::{Shutdown, TransportError};
use crate::listener::{EventSink, PollEvent};
use crate::poll::stop::StopListener;

/// Delimits frames in the inbound byte stream
///
/// Modbus RTU carries no length prefix, so a frame ends when the line goes silent or when
/// the buffer reaches the maximum frame length. There is no resynchronization.
pub(crate) struct FrameAssembler {
    buffer: Vec<u8>,
    max_length: usize,
}

impl FrameAssembler {
    pub(crate) fn new(max_length: usize) -> Self {
        let max_length = max_length.clamp(1, MAX_FRAME_LENGTH);
        Self {
            buffer: Vec::with_capacity(max_length),
            max_length,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// append received bytes, returning every frame that reached the maximum length
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for chunk in bytes.chunks(self.max_length) {
            let space = self.max_length - self.buffer.len();
            let (head, tail) = chunk.split_at(chunk.len().min(space));
            self.buffer.extend_from_slice(head);
            if self.buffer.len() == self.max_length {
                frames.push(self.flush());
            }
            self.buffer.extend_from_slice(tail);
        }
        frames
    }

    /// take the buffered bytes as a frame, which is empty if nothing was buffered
    pub(crate) fn flush(&mut self) -> Frame {
        Frame::new(std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.max_length),
        ))
    }
}

/// Drains the transport and forwards assembled frames to the decoder
pub(crate) struct ReadTask {
    pub(crate) reader: PhysReader,
    pub(crate) assembler: FrameAssembler,
    pub(crate) idle_timeout: Duration,
    pub(crate) decode: DecodeLevel,
    pub(crate) inbound: tokio::sync::mpsc::Sender<Frame>,
    pub(crate) stop: StopListener,
    pub(crate) events: EventSink,
}

impl ReadTask {
    /// Runs until stopped, the decoder goes away, or the stream fails or ends
    pub(crate) async fn run(mut self) -> Result<(), TransportError> {
        let mut buffer = [0u8; MAX_FRAME_LENGTH];
        loop {
            if self.stop.is_stopped() {
                return Ok(());
            }

            let result = tokio::time::timeout(
                self.idle_timeout,
                self.reader.read(&mut buffer, self.decode.physical),
            )
            .await;

            let outcome = match result {
                // silence on the line ends the frame
                Err(_) => {
                    if !self.assembler.is_empty() {
                        let frame = self.assembler.flush();
                        if self.dispatch(frame).await.is_err() {
                            return Ok(());
                        }
                    }
                    continue;
                }
                Ok(Ok(0)) => Err(TransportError::Closed),
                Ok(Ok(count)) => Ok(count),
                Ok(Err(err)) => Err(TransportError::from(err)),
            };

            match outcome {
                Ok(count) => {
                    for frame in self.assembler.push(&buffer[..count]) {
                        if self.dispatch(frame).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Err(err) => {
                    if !self.assembler.is_empty() {
                        let frame = self.assembler.flush();
                        let _ = self.dispatch(frame).await;
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<(), Shutdown> {
        if self.decode.frame.enabled() {
            tracing::info!(
                "RTU RX - {}",
                FrameDisplay::new(self.decode.frame, frame.as_bytes())
            );
        }
        self.events
            .emit(PollEvent::FrameReceived(frame.clone()))
            .await;
        self.inbound.send(frame).await.map_err(|_| Shutdown)
    }
}
