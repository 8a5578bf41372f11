use std::fmt::Write;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time::{Duration, Instant};

use crate::decode::PhysDecodeLevel;

/// Any byte stream the poller can run on
pub(crate) trait PhysIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> PhysIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PhysKind {
    Tcp,
    #[cfg(feature = "serial")]
    Serial,
    Stream,
}

/// An open transport, before it is split between the read and write tasks
pub(crate) struct PhysLayer {
    kind: PhysKind,
    // minimum silence between two writes, only enforced on serial lines
    inter_frame_delay: Option<Duration>,
    io: Box<dyn PhysIo>,
}

pub(crate) struct PhysReader {
    kind: PhysKind,
    io: ReadHalf<Box<dyn PhysIo>>,
}

pub(crate) struct PhysWriter {
    kind: PhysKind,
    inter_frame_delay: Option<Duration>,
    last_activity: Option<Instant>,
    io: WriteHalf<Box<dyn PhysIo>>,
}

impl std::fmt::Debug for PhysLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self.kind)
    }
}

impl PhysLayer {
    pub(crate) fn new_tcp(socket: tokio::net::TcpStream) -> Self {
        Self {
            kind: PhysKind::Tcp,
            inter_frame_delay: None,
            io: Box::new(socket),
        }
    }

    #[cfg(feature = "serial")]
    pub(crate) fn new_serial(stream: tokio_serial::SerialStream) -> Self {
        let delay = calculate_inter_frame_delay(&stream);
        Self {
            kind: PhysKind::Serial,
            inter_frame_delay: Some(delay),
            io: Box::new(stream),
        }
    }

    pub(crate) fn new_stream<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            kind: PhysKind::Stream,
            inter_frame_delay: None,
            io: Box::new(io),
        }
    }

    pub(crate) fn split(self) -> (PhysReader, PhysWriter) {
        let (read, write) = tokio::io::split(self.io);
        (
            PhysReader {
                kind: self.kind,
                io: read,
            },
            PhysWriter {
                kind: self.kind,
                inter_frame_delay: self.inter_frame_delay,
                last_activity: None,
                io: write,
            },
        )
    }
}

impl PhysReader {
    /// read whatever is currently available, waiting for at least one byte
    ///
    /// a return of 0 means the stream has ended
    pub(crate) async fn read(
        &mut self,
        buffer: &mut [u8],
        decode_level: PhysDecodeLevel,
    ) -> Result<usize, std::io::Error> {
        let length = self.io.read(buffer).await?;

        if decode_level.enabled() {
            if let Some(x) = buffer.get(0..length) {
                tracing::info!("PHYS RX ({:?}) - {}", self.kind, PhysDisplay::new(decode_level, x))
            }
        }

        Ok(length)
    }
}

impl PhysWriter {
    pub(crate) async fn write(
        &mut self,
        data: &[u8],
        decode_level: PhysDecodeLevel,
    ) -> Result<(), std::io::Error> {
        // respect the silent interval between frames on serial lines
        if let (Some(delay), Some(last_activity)) = (self.inter_frame_delay, self.last_activity) {
            tokio::time::sleep_until(last_activity + delay).await;
        }

        if decode_level.enabled() {
            tracing::info!("PHYS TX ({:?}) - {}", self.kind, PhysDisplay::new(decode_level, data));
        }

        self.io.write_all(data).await?;
        self.io.flush().await?;
        self.last_activity = Some(Instant::now());
        Ok(())
    }

    pub(crate) async fn shutdown(&mut self) {
        if let Err(err) = self.io.shutdown().await {
            tracing::debug!("error shutting down the write side: {}", err);
        }
    }
}

pub(crate) struct PhysDisplay<'a> {
    level: PhysDecodeLevel,
    data: &'a [u8],
}

impl<'a> PhysDisplay<'a> {
    pub(crate) fn new(level: PhysDecodeLevel, data: &'a [u8]) -> Self {
        PhysDisplay { level, data }
    }
}

impl std::fmt::Display for PhysDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} bytes", self.data.len())?;
        if self.level.data_enabled() {
            format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

#[cfg(feature = "serial")]
fn calculate_inter_frame_delay(serial: &tokio_serial::SerialStream) -> Duration {
    use tokio_serial::SerialPort;

    // Modbus RTU uses 11-bit characters (1 start, 8 data, 1 parity or stop, 1 stop)
    const NUM_BITS_IN_CHAR: u64 = 11;

    // Above 19200 baud the silent interval is fixed
    const MAX_BAUD_RATE: u32 = 19200;
    const MIN_DELAY: Duration = Duration::from_micros(1750);

    match serial.baud_rate() {
        Ok(baud_rate) if baud_rate > 0 && baud_rate <= MAX_BAUD_RATE => {
            let character_time = Duration::from_secs(NUM_BITS_IN_CHAR) / baud_rate;
            35 * character_time / 10 // multiply by 3.5
        }
        Ok(_) => MIN_DELAY,
        Err(_) => {
            tracing::warn!(
                "unable to determine the baud rate, defaulting to {} us",
                MIN_DELAY.as_micros()
            );
            MIN_DELAY
        }
    }
}

const BYTES_PER_DECODE_LINE: usize = 18;

pub(crate) fn format_bytes(f: &mut std::fmt::Formatter, bytes: &[u8]) -> std::fmt::Result {
    for chunk in bytes.chunks(BYTES_PER_DECODE_LINE) {
        writeln!(f)?;
        let mut first = true;
        for byte in chunk {
            if !first {
                f.write_char(' ')?;
            }
            first = false;
            write!(f, "{byte:02X?}")?;
        }
    }
    Ok(())
}
