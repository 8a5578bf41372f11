//! A Modbus polling master built on [Tokio](https://docs.rs/tokio).
//!
//! The library continuously polls holding and input registers from one or more devices
//! attached to a serial line (Modbus RTU) or a TCP socket carrying the same RTU framing,
//! and decodes the returned register bytes onto typed, named [`MeasurementPoint`]s.
//!
//! # Features
//!
//! * Minimal request planning: the points of a device are coalesced into as few
//!   read requests as possible, long ranges are split with an overlap so that no
//!   point straddles a request boundary
//! * Strict single request in flight per transport with a bounded response wait
//! * Idle-timeout framing of the inbound byte stream
//! * Panic-free parsing of everything that arrives on the wire
//!
//! # Supported functions
//!
//! * Read Holding Registers (0x03)
//! * Read Input Registers (0x04)
//!
//! # Example
//!
//! ```no_run
//! use modpoll::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device = Device::new("meter", UnitId::new(1));
//!     device.add_point(MeasurementPoint::new("voltage", 100, RegisterBank::Holding, ValueType::F32)?);
//!     device.add_point(MeasurementPoint::new("status", 0, RegisterBank::Input, ValueType::U16)?);
//!
//!     let poller = spawn_poller(
//!         TransportConfig::tcp("127.0.0.1", 502),
//!         PollSettings::default(),
//!         vec![device.clone()],
//!         NullListener::create(),
//!     )
//!     .await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     for point in device.points() {
//!         println!("{point}");
//!     }
//!
//!     poller.stop().await;
//!     Ok(())
//! }
//! ```

pub(crate) mod channel;
pub(crate) mod common;
pub(crate) mod constants;
mod decode;
mod device;
mod error;
mod exception;
mod listener;
mod maybe_async;
mod poll;
#[cfg(feature = "serial")]
mod serial;
mod tcp;
mod types;

#[cfg(feature = "serialization")]
mod config;

pub use crate::common::crc::{append_checksum, checksum, is_valid};
pub use crate::common::frame::{Frame, HexError};
pub use crate::decode::*;
pub use crate::device::plan::{PlanLimits, ReadRequest, RequestPlan};
pub use crate::device::*;
pub use crate::error::*;
pub use crate::exception::ExceptionCode;
pub use crate::listener::*;
pub use crate::maybe_async::MaybeAsync;
pub use crate::poll::*;
#[cfg(feature = "serial")]
pub use crate::serial::*;
pub use crate::types::*;

#[cfg(feature = "serialization")]
pub use crate::config::*;
