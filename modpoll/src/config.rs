use serde::{Deserialize, Serialize};

use crate::device::{Device, MeasurementPoint};
use crate::error::InvalidPoint;
use crate::poll::{PollSettings, TransportConfig};
use crate::types::{ByteOrder, RegisterBank, UnitId, ValueType};

/// Everything needed to start a poller: the transport, its settings and its devices
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// link the devices are attached to
    pub transport: TransportConfig,
    /// timing, framing and logging
    #[serde(default)]
    pub settings: PollSettings,
    /// devices polled on the transport
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// Definition of a device and its points
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// name of the device
    pub name: String,
    /// unit id the device responds to
    pub unit_id: UnitId,
    /// byte order of multi-word values
    #[serde(default)]
    pub byte_order: ByteOrder,
    /// whether the device is polled
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// points read from the device
    #[serde(default)]
    pub points: Vec<PointConfig>,
}

/// Definition of a measurement point
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointConfig {
    /// name, unique within the device
    pub name: String,
    /// address of the first word
    pub address: u16,
    /// bank the point is read from
    pub bank: RegisterBank,
    /// how the words are decoded
    pub value_type: ValueType,
}

fn enabled_by_default() -> bool {
    true
}

impl PollerConfig {
    /// Create the devices described by the configuration
    pub fn build_devices(&self) -> Result<Vec<Device>, InvalidPoint> {
        self.devices.iter().map(DeviceConfig::build).collect()
    }
}

impl DeviceConfig {
    /// Create the device and its points
    pub fn build(&self) -> Result<Device, InvalidPoint> {
        let points = self
            .points
            .iter()
            .map(PointConfig::build)
            .collect::<Result<Vec<_>, _>>()?;

        let device = Device::with_byte_order(self.name.clone(), self.unit_id, self.byte_order);
        device.set_enabled(self.enabled);
        device.set_points(points);
        Ok(device)
    }
}

impl PointConfig {
    /// Create the point
    pub fn build(&self) -> Result<MeasurementPoint, InvalidPoint> {
        MeasurementPoint::new(self.name.clone(), self.address, self.bank, self.value_type)
    }
}

/// (de)serializes a `Duration` as a whole number of milliseconds
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::decode::AppDecodeLevel;

    const CONFIG: &str = r#"{
        "transport": { "type": "tcp", "host": "192.168.0.10", "port": 502 },
        "settings": {
            "response_timeout": 500,
            "frame": { "idle_timeout": 15 },
            "decode": { "app": "DataValues" }
        },
        "devices": [
            {
                "name": "meter",
                "unit_id": 3,
                "byte_order": "Cdab",
                "points": [
                    { "name": "voltage", "address": 100, "bank": "Holding", "value_type": "F32" },
                    { "name": "status", "address": 7, "bank": "Input", "value_type": "U16" }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_json_with_defaults() {
        let config: PollerConfig = serde_json::from_str(CONFIG).unwrap();

        assert_eq!(config.transport, TransportConfig::tcp("192.168.0.10", 502));
        assert_eq!(config.settings.response_timeout, Duration::from_millis(500));
        assert_eq!(
            config.settings.inter_frame_delay,
            PollSettings::default().inter_frame_delay
        );
        assert_eq!(config.settings.frame.idle_timeout, Duration::from_millis(15));
        assert_eq!(config.settings.frame.max_frame_length, 256);
        assert_eq!(config.settings.decode.app, AppDecodeLevel::DataValues);

        let device = &config.devices[0];
        assert_eq!(device.unit_id, UnitId::new(3));
        assert_eq!(device.byte_order, ByteOrder::Cdab);
        assert!(device.enabled);
        assert_eq!(device.points.len(), 2);
    }

    #[test]
    fn builds_devices() {
        let config: PollerConfig = serde_json::from_str(CONFIG).unwrap();
        let devices = config.build_devices().unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name(), "meter");
        assert_eq!(devices[0].byte_order(), ByteOrder::Cdab);
        assert_eq!(devices[0].points().len(), 2);
        assert_eq!(devices[0].request_plan(Default::default()).len(), 2);
    }

    #[test]
    fn rejects_points_beyond_the_register_space() {
        let device = DeviceConfig {
            name: "bad".to_string(),
            unit_id: UnitId::new(1),
            byte_order: ByteOrder::Abcd,
            enabled: true,
            points: vec![PointConfig {
                name: "x".to_string(),
                address: 0xFFFF,
                bank: RegisterBank::Holding,
                value_type: ValueType::U32,
            }],
        };
        assert!(device.build().is_err());
    }

    #[test]
    fn durations_round_trip_as_milliseconds() {
        let settings = PollSettings::default();
        let json = serde_json::to_value(settings).unwrap();
        assert_eq!(json["response_timeout"], 1000);
        assert_eq!(json["inter_frame_delay"], 50);
        assert_eq!(json["frame"]["idle_timeout"], 20);
    }
}
