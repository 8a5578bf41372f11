//! Command-line Modbus polling master

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use modpoll::*;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("unable to read {0}: {1}")]
    ReadConfig(PathBuf, std::io::Error),
    #[error("invalid configuration: {0}")]
    ParseConfig(#[from] serde_json::Error),
    #[error(transparent)]
    BadPoint(#[from] InvalidPoint),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no transport specified, use --config, --host or --serial")]
    NoTransport,
}

#[derive(Parser)]
#[command(name = "modpoll-client")]
#[command(about = "A command line program that polls Modbus devices using the modpoll crate")]
#[command(version)]
struct Cli {
    #[arg(short = 'c', long, help = "JSON file describing the transport, settings and devices")]
    config: Option<PathBuf>,

    #[arg(long, conflicts_with = "serial", help = "host of a device carrying RTU frames over TCP")]
    host: Option<String>,

    #[arg(long, default_value_t = 502, help = "TCP port used with --host")]
    port: u16,

    #[arg(long, help = "serial port, e.g. /dev/ttyUSB0 or COM3")]
    serial: Option<String>,

    #[arg(long, default_value_t = 9600, help = "baud rate used with --serial")]
    baud: u32,

    #[arg(short = 'i', long, default_value_t = 1, help = "unit id of the device defined by --point")]
    id: u8,

    #[arg(
        long = "point",
        value_parser = parse_point,
        help = "a point of the form name:address:bank:type, e.g. voltage:100:holding:f32"
    )]
    points: Vec<PointConfig>,

    #[arg(short = 't', long, help = "response timeout in milliseconds")]
    timeout: Option<u64>,

    #[arg(short = 'd', long, help = "delay after each request in milliseconds")]
    delay: Option<u64>,

    #[arg(short = 'p', long, default_value_t = 1000, help = "period in milliseconds at which point values are printed")]
    period: u64,

    #[arg(long, help = "a frame in hex, e.g. \"01 03 00 64 00 02 85 D4\", sent once after startup")]
    send: Option<String>,

    #[arg(short = 'v', long, action = clap::ArgAction::Count, help = "log decoded values, then frames, then raw bytes")]
    verbose: u8,
}

fn parse_point(text: &str) -> Result<PointConfig, String> {
    let parts: Vec<&str> = text.split(':').collect();
    let [name, address, bank, value_type] = parts.as_slice() else {
        return Err("expected name:address:bank:type".to_string());
    };

    let address = address
        .parse::<u16>()
        .map_err(|err| format!("bad address '{address}': {err}"))?;

    let bank = match bank.to_ascii_lowercase().as_str() {
        "holding" | "hr" | "3" => RegisterBank::Holding,
        "input" | "ir" | "4" => RegisterBank::Input,
        other => return Err(format!("unknown register bank '{other}'")),
    };

    let value_type = match value_type.to_ascii_lowercase().as_str() {
        "u16" => ValueType::U16,
        "i16" => ValueType::I16,
        "u32" => ValueType::U32,
        "i32" => ValueType::I32,
        "u64" => ValueType::U64,
        "i64" => ValueType::I64,
        "f32" => ValueType::F32,
        "f64" => ValueType::F64,
        "hex" => ValueType::Hex,
        other => return Err(format!("unknown value type '{other}'")),
    };

    Ok(PointConfig {
        name: name.to_string(),
        address,
        bank,
        value_type,
    })
}

/// logs frames as they are exchanged and forwards state changes to the main loop
struct EventListener {
    tx: tokio::sync::mpsc::Sender<PollState>,
}

impl EventListener {
    fn create() -> (Self, tokio::sync::mpsc::Receiver<PollState>) {
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        (Self { tx }, rx)
    }
}

impl Listener<PollEvent> for EventListener {
    fn update(&mut self, event: PollEvent) -> MaybeAsync<()> {
        match event {
            PollEvent::FrameSent(frame) => tracing::info!("TX: {frame}"),
            PollEvent::FrameReceived(frame) => tracing::info!("RX: {frame}"),
            PollEvent::TransportError(err) => tracing::warn!("transport error: {err}"),
            PollEvent::StateChanged(state) => {
                tracing::info!("state: {state}");
                let _ = self.tx.try_send(state);
            }
        }
        MaybeAsync::ready(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    if let Err(ref e) = run().await {
        println!("error: {e}");
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<PollerConfig, Error> {
    let file = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|err| Error::ReadConfig(path.clone(), err))?;
            Some(serde_json::from_str::<PollerConfig>(&text)?)
        }
        None => None,
    };

    let transport = match (&cli.host, &cli.serial) {
        (Some(host), _) => Some(TransportConfig::tcp(host.clone(), cli.port)),
        (None, Some(path)) => Some(TransportConfig::serial(
            path.clone(),
            SerialSettings {
                baud_rate: cli.baud,
                ..SerialSettings::default()
            },
        )),
        (None, None) => None,
    };

    let mut config = match (file, transport) {
        (Some(mut config), Some(transport)) => {
            config.transport = transport;
            config
        }
        (Some(config), None) => config,
        (None, Some(transport)) => PollerConfig {
            transport,
            settings: PollSettings::default(),
            devices: Vec::new(),
        },
        (None, None) => return Err(Error::NoTransport),
    };

    if !cli.points.is_empty() {
        config.devices.push(DeviceConfig {
            name: format!("unit {}", cli.id),
            unit_id: UnitId::new(cli.id),
            byte_order: ByteOrder::default(),
            enabled: true,
            points: cli.points.clone(),
        });
    }

    if let Some(timeout) = cli.timeout {
        config.settings.response_timeout = Duration::from_millis(timeout);
    }
    if let Some(delay) = cli.delay {
        config.settings.inter_frame_delay = Duration::from_millis(delay);
    }
    if cli.verbose > 0 {
        config.settings.decode = config.settings.decode.application(AppDecodeLevel::DataValues);
    }
    if cli.verbose > 1 {
        config.settings.decode = config.settings.decode.frame(FrameDecodeLevel::Payload);
    }
    if cli.verbose > 2 {
        config.settings.decode = config.settings.decode.physical(PhysDecodeLevel::Data);
    }

    Ok(config)
}

async fn run() -> Result<(), Error> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let devices = config.build_devices()?;

    if devices.is_empty() {
        tracing::warn!("no devices configured, only manually entered frames will be sent");
    }

    let (listener, mut rx) = EventListener::create();
    let poller = spawn_poller(
        config.transport.clone(),
        config.settings,
        devices.clone(),
        Box::new(listener),
    )
    .await?;

    if let Some(text) = &cli.send {
        if !poller.send_hex(text) {
            tracing::warn!("unable to send {text}");
        }
    }

    let mut interval = tokio::time::interval(Duration::from_millis(cli.period.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            state = rx.recv() => {
                if matches!(state, None | Some(PollState::Stopped)) {
                    break;
                }
            }
            _ = interval.tick() => print_points(&devices),
        }
    }

    poller.stop().await;
    print_points(&devices);
    Ok(())
}

fn print_points(devices: &[Device]) {
    for device in devices {
        println!("{} ({}):", device.name(), device.unit_id());
        for point in device.points() {
            println!("  {point}");
        }
    }
}
