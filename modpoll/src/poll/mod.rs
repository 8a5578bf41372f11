use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::Instrument;

use crate::channel;
use crate::common::frame::Frame;
use crate::common::phys::PhysLayer;
use crate::constants::frame::MAX_FRAME_LENGTH;
use crate::constants::queues::{INBOUND_QUEUE_SIZE, OUTBOUND_QUEUE_SIZE};
use crate::constants::timing::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_INTER_FRAME_DELAY, DEFAULT_RESPONSE_TIMEOUT,
};
use crate::decode::DecodeLevel;
use crate::device::plan::PlanLimits;
use crate::device::Device;
use crate::error::TransportError;
use crate::listener::{EventSink, Listener, PollEvent, PollState};
#[cfg(feature = "serial")]
use crate::serial::SerialSettings;

use self::assembler::{FrameAssembler, ReadTask};
use self::correlate::Correlator;
use self::gate::PollGate;
use self::scheduler::Scheduler;
use self::stop::StopSignal;
use self::writer::WriteTask;

mod assembler;
mod correlate;
mod gate;
mod scheduler;
mod stop;
mod writer;

/// The link a poller runs on
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialization", serde(tag = "type", rename_all = "snake_case"))]
pub enum TransportConfig {
    /// Modbus RTU on a serial port
    #[cfg(feature = "serial")]
    Serial {
        /// name of the port, e.g. `/dev/ttyUSB0` or `COM3`
        path: String,
        /// line settings
        #[cfg_attr(feature = "serialization", serde(default))]
        settings: SerialSettings,
    },
    /// RTU frames carried over a TCP socket
    Tcp {
        /// host name or IP address
        host: String,
        /// TCP port
        port: u16,
    },
}

/// How the inbound byte stream is split into frames
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialization", serde(default))]
pub struct FrameSettings {
    /// silence on the line that ends a frame
    #[cfg_attr(feature = "serialization", serde(with = "crate::config::millis"))]
    pub idle_timeout: Duration,
    /// buffer length that ends a frame without waiting for silence, at most 256
    pub max_frame_length: usize,
}

/// Settings of a running poller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialization", serde(default))]
pub struct PollSettings {
    /// how long the scheduler waits for a response before sending the next request
    #[cfg_attr(feature = "serialization", serde(with = "crate::config::millis"))]
    pub response_timeout: Duration,
    /// pause after every write
    #[cfg_attr(feature = "serialization", serde(with = "crate::config::millis"))]
    pub inter_frame_delay: Duration,
    /// framing of the inbound byte stream
    pub frame: FrameSettings,
    /// limits used when planning requests
    pub limits: PlanLimits,
    /// what gets logged
    pub decode: DecodeLevel,
}

/// Handle to a running poller
///
/// Dropping the handle stops the poller without waiting for its tasks to exit.
pub struct PollerHandle {
    devices: Arc<Mutex<Vec<Device>>>,
    outbound: tokio::sync::mpsc::Sender<Frame>,
    state: Arc<Mutex<PollState>>,
    stop: StopSignal,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TransportConfig {
    /// RTU over TCP to `host:port`
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        TransportConfig::Tcp {
            host: host.into(),
            port,
        }
    }

    /// RTU on the named serial port
    #[cfg(feature = "serial")]
    pub fn serial(path: impl Into<String>, settings: SerialSettings) -> Self {
        TransportConfig::Serial {
            path: path.into(),
            settings,
        }
    }
}

impl std::fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            #[cfg(feature = "serial")]
            TransportConfig::Serial { path, .. } => write!(f, "serial {path}"),
            TransportConfig::Tcp { host, port } => write!(f, "tcp {host}:{port}"),
        }
    }
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            inter_frame_delay: DEFAULT_INTER_FRAME_DELAY,
            frame: FrameSettings::default(),
            limits: PlanLimits::default(),
            decode: DecodeLevel::default(),
        }
    }
}

/// Open the transport and start polling `devices`
///
/// Each device should belong to a single poller. Progress is reported to `listener`.
pub async fn spawn_poller(
    config: TransportConfig,
    settings: PollSettings,
    devices: Vec<Device>,
    listener: Box<dyn Listener<PollEvent>>,
) -> Result<PollerHandle, TransportError> {
    let phys = match &config {
        #[cfg(feature = "serial")]
        TransportConfig::Serial { path, settings } => {
            PhysLayer::new_serial(crate::serial::open(path, *settings)?)
        }
        TransportConfig::Tcp { host, port } => {
            PhysLayer::new_tcp(crate::tcp::connect(host, *port).await?)
        }
    };

    let span = tracing::info_span!("Modbus-Poller", transport = %config);
    Ok(spawn(phys, settings, devices, listener, span))
}

/// Start polling `devices` on an already open byte stream
///
/// Must be called from within a Tokio runtime.
pub fn spawn_poller_on<T>(
    io: T,
    settings: PollSettings,
    devices: Vec<Device>,
    listener: Box<dyn Listener<PollEvent>>,
) -> PollerHandle
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let span = tracing::info_span!("Modbus-Poller", transport = "stream");
    spawn(PhysLayer::new_stream(io), settings, devices, listener, span)
}

fn spawn(
    phys: PhysLayer,
    settings: PollSettings,
    devices: Vec<Device>,
    listener: Box<dyn Listener<PollEvent>>,
    span: tracing::Span,
) -> PollerHandle {
    let events = EventSink::new(listener);
    let stop = StopSignal::new();
    let state = Arc::new(Mutex::new(PollState::Running));
    let devices = Arc::new(Mutex::new(devices));

    let (outbound_tx, outbound_rx) = channel::bounded(OUTBOUND_QUEUE_SIZE);
    let (inbound_tx, inbound_rx) = channel::bounded(INBOUND_QUEUE_SIZE);
    let (gate, observer) = PollGate::create();
    let (reader, writer) = phys.split();

    let tasks = Tasks {
        read: ReadTask {
            reader,
            assembler: FrameAssembler::new(settings.frame.max_frame_length),
            idle_timeout: settings.frame.idle_timeout,
            decode: settings.decode,
            inbound: inbound_tx,
            stop: stop.listener(),
            events: events.clone(),
        },
        write: WriteTask {
            writer,
            outbound: outbound_rx,
            inter_frame_delay: settings.inter_frame_delay,
            decode: settings.decode,
            stop: stop.listener(),
            events: events.clone(),
        },
        correlator: Correlator::new(observer, settings.decode),
        inbound: inbound_rx,
        scheduler: Scheduler {
            devices: devices.clone(),
            gate,
            outbound: outbound_tx.clone(),
            response_timeout: settings.response_timeout,
            inter_frame_delay: settings.inter_frame_delay,
            limits: settings.limits,
            stop: stop.listener(),
        },
    };

    let task = tokio::spawn(
        tasks
            .run(stop.clone(), state.clone(), events)
            .instrument(span),
    );

    PollerHandle {
        devices,
        outbound: outbound_tx,
        state,
        stop,
        task: Some(task),
    }
}

struct Tasks {
    read: ReadTask,
    write: WriteTask,
    correlator: Correlator,
    inbound: channel::Receiver<Frame>,
    scheduler: Scheduler,
}

impl Tasks {
    async fn run(self, stop: StopSignal, state: Arc<Mutex<PollState>>, events: EventSink) {
        tracing::info!("poller starting");
        events
            .emit(PollEvent::StateChanged(PollState::Running))
            .await;

        let read = {
            let (stop, events) = (stop.clone(), events.clone());
            let task = self.read;
            tokio::spawn(
                async move { report(task.run().await, &stop, &events).await }.in_current_span(),
            )
        };
        let write = {
            let (stop, events) = (stop.clone(), events.clone());
            let task = self.write;
            tokio::spawn(
                async move { report(task.run().await, &stop, &events).await }.in_current_span(),
            )
        };
        let decode = tokio::spawn(self.correlator.run(self.inbound).in_current_span());
        let schedule = tokio::spawn(self.scheduler.run().in_current_span());

        for (name, handle) in [
            ("read", read),
            ("write", write),
            ("decode", decode),
            ("schedule", schedule),
        ] {
            if let Err(err) = handle.await {
                tracing::error!("{} task failed: {}", name, err);
                stop.stop();
            }
        }

        *state.lock() = PollState::Stopped;
        events
            .emit(PollEvent::StateChanged(PollState::Stopped))
            .await;
        tracing::info!("poller stopped");
    }
}

async fn report(result: Result<(), TransportError>, stop: &StopSignal, events: &EventSink) {
    if let Err(err) = result {
        if !stop.is_stopped() {
            tracing::warn!("transport error: {}", err);
            events.emit(PollEvent::TransportError(err.to_string())).await;
        }
        stop.stop();
    }
}

impl PollerHandle {
    /// Current state of the poller
    pub fn state(&self) -> PollState {
        *self.state.lock()
    }

    /// Start polling another device on the next pass, returns false if it is already polled
    pub fn add_device(&self, device: Device) -> bool {
        let mut devices = self.devices.lock();
        if devices.iter().any(|x| x.ptr_eq(&device)) {
            return false;
        }
        devices.push(device);
        true
    }

    /// Stop polling a device from the next pass, returns false if it wasn't polled
    pub fn remove_device(&self, device: &Device) -> bool {
        let mut devices = self.devices.lock();
        let before = devices.len();
        devices.retain(|x| !x.ptr_eq(device));
        devices.len() != before
    }

    /// The devices being polled
    pub fn devices(&self) -> Vec<Device> {
        self.devices.lock().clone()
    }

    /// Queue a manually entered frame such as `01 03 00 64 00 02 85 D4` for transmission
    ///
    /// The frame is sent exactly as written, without CRC validation, and does not take
    /// part in response correlation. Returns false if the text can't be parsed, if the
    /// poller is stopped or if the outbound queue is full.
    pub fn send_hex(&self, text: &str) -> bool {
        let frame = match Frame::from_hex(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!("unable to send {:?}: {}", text, err);
                return false;
            }
        };

        if self.state() == PollState::Stopped || self.stop.is_stopped() {
            tracing::warn!("unable to send frame, the poller is stopped");
            return false;
        }

        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("unable to queue frame: {}", err);
                false
            }
        }
    }

    /// Stop polling and wait for every task to exit
    pub async fn stop(mut self) {
        self.stop.stop();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::error!("poller task failed: {}", err);
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

impl std::fmt::Debug for PollerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PollerHandle")
            .field("state", &self.state())
            .field("devices", &self.devices.lock().len())
            .finish()
    }
}
