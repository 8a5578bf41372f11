use scursor::ReadCursor;

use crate::channel::Receiver;
use crate::common::crc;
use crate::common::frame::Frame;
use crate::constants::frame::{CRC_LENGTH, EXCEPTION_MASK};
use crate::decode::DecodeLevel;
use crate::device::MeasurementPoint;
use crate::error::FrameError;
use crate::exception::ExceptionCode;
use crate::poll::gate::CycleObserver;
use crate::types::{ByteOrder, RegisterBank, UnitId, Value, ValueType};

/// Number of decimal places kept when decoding single precision floats
pub(crate) const FLOAT_DECIMALS: i32 = 2;

struct Response<'a> {
    unit_id: UnitId,
    function: u8,
    byte_count: u8,
    payload: &'a [u8],
}

/// Matches inbound frames against the outstanding request and stores the decoded values
pub(crate) struct Correlator {
    observer: CycleObserver,
    decode: DecodeLevel,
}

impl Correlator {
    pub(crate) fn new(observer: CycleObserver, decode: DecodeLevel) -> Self {
        Self { observer, decode }
    }

    /// Runs until the read task closes the inbound queue
    pub(crate) async fn run(mut self, mut inbound: Receiver<Frame>) {
        while let Ok(frame) = inbound.recv().await {
            self.handle(&frame);
        }
        tracing::debug!("inbound queue closed");
    }

    pub(crate) fn handle(&mut self, frame: &Frame) {
        match self.process(frame.as_bytes()) {
            Ok(()) => {}
            Err(FrameError::Exception(ex)) => {
                tracing::warn!("device returned exception: {}", ex);
            }
            Err(err) => {
                tracing::debug!("discarding frame [{}]: {}", frame, err);
            }
        }
    }

    /// Validate a frame and decode it onto the points of the outstanding request
    ///
    /// Only a correlated response completes the cycle. Points are untouched on any error.
    pub(crate) fn process(&mut self, frame: &[u8]) -> Result<(), FrameError> {
        let (body, received) =
            crc::split_trailer(frame).ok_or(FrameError::TooShort(frame.len()))?;
        let expected = crc::checksum(body);
        if expected != received {
            return Err(FrameError::CrcMismatch(received, expected));
        }

        let cycle = self
            .observer
            .current()
            .ok_or(FrameError::NoOutstandingRequest)?;
        let request = &cycle.request;

        let response = parse_response(body, request.bank.function_code())?;

        if response.unit_id != request.unit_id {
            return Err(FrameError::UnitIdMismatch(request.unit_id, response.unit_id));
        }
        if RegisterBank::from_function_code(response.function) != Some(request.bank) {
            return Err(FrameError::FunctionMismatch(
                request.bank.function_code(),
                response.function,
            ));
        }
        if request.range.count != (response.byte_count / 2) as u16 {
            return Err(FrameError::CountMismatch(
                request.range.count,
                response.byte_count,
            ));
        }

        let start = request.range.start;
        let byte_order = cycle.device.byte_order();
        let payload = response.payload;
        let updated = cycle
            .device
            .update_points(request.bank, request.range, |point| {
                decode_point(point, start, byte_order, payload)
            });

        if self.decode.app.enabled() {
            tracing::info!(
                "{} - device: {} updated {} point(s)",
                request,
                cycle.device.name(),
                updated.len()
            );
            if self.decode.app.data_values() {
                for (point, value) in &updated {
                    tracing::info!("{} = {}", point, value);
                }
            }
        }

        self.observer.complete(&cycle);
        Ok(())
    }
}

fn parse_response(body: &[u8], expected_function: u8) -> Result<Response<'_>, FrameError> {
    let too_short = |_| FrameError::TooShort(body.len() + CRC_LENGTH);
    let mut cursor = ReadCursor::new(body);
    let unit_id = UnitId::new(cursor.read_u8().map_err(too_short)?);
    let function = cursor.read_u8().map_err(too_short)?;

    if function == expected_function | EXCEPTION_MASK {
        let code = cursor.read_u8().map_err(too_short)?;
        return Err(FrameError::Exception(ExceptionCode::from(code)));
    }

    let byte_count = cursor.read_u8().map_err(too_short)?;
    let remaining = cursor.remaining();
    if remaining != byte_count as usize {
        return Err(FrameError::ByteCountMismatch(byte_count, remaining));
    }
    let payload = cursor.read_bytes(remaining)?;

    Ok(Response {
        unit_id,
        function,
        byte_count,
        payload,
    })
}

fn decode_point(
    point: &MeasurementPoint,
    start: u16,
    byte_order: ByteOrder,
    payload: &[u8],
) -> Option<Value> {
    let offset = (point.address().checked_sub(start)? as usize) * 2;
    let bytes = payload.get(offset..offset + point.value_type().byte_width())?;
    decode_value(point.value_type(), byte_order, bytes)
}

pub(crate) fn decode_value(
    value_type: ValueType,
    byte_order: ByteOrder,
    bytes: &[u8],
) -> Option<Value> {
    if value_type == ValueType::Hex {
        return Some(Value::Hex(bytes.to_vec()));
    }

    let mut raw = bytes.to_vec();
    byte_order.to_big_endian(&mut raw);

    let value = match value_type {
        ValueType::U16 => Value::U16(u16::from_be_bytes(array(&raw)?)),
        ValueType::I16 => Value::I16(i16::from_be_bytes(array(&raw)?)),
        ValueType::U32 => Value::U32(u32::from_be_bytes(array(&raw)?)),
        ValueType::I32 => Value::I32(i32::from_be_bytes(array(&raw)?)),
        ValueType::U64 => Value::U64(u64::from_be_bytes(array(&raw)?)),
        ValueType::I64 => Value::I64(i64::from_be_bytes(array(&raw)?)),
        ValueType::F32 => Value::F32(round_float(f32::from_be_bytes(array(&raw)?))),
        ValueType::F64 => Value::F64(f64::from_be_bytes(array(&raw)?)),
        ValueType::Hex => Value::Hex(raw),
    };
    Some(value)
}

fn array<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    bytes.try_into().ok()
}

fn round_float(value: f32) -> f32 {
    let scale = 10f64.powi(FLOAT_DECIMALS);
    ((value as f64 * scale).round_ties_even() / scale) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::plan::ReadRequest;
    use crate::device::Device;
    use crate::poll::gate::PollGate;
    use crate::types::AddressRange;

    fn response(unit: u8, function: u8, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![unit, function, payload.len() as u8];
        bytes.extend_from_slice(payload);
        crc::append_checksum(&mut bytes);
        bytes
    }

    fn holding(name: &str, address: u16, value_type: ValueType) -> MeasurementPoint {
        MeasurementPoint::new(name, address, RegisterBank::Holding, value_type).unwrap()
    }

    struct Fixture {
        gate: PollGate,
        correlator: Correlator,
        device: Device,
    }

    impl Fixture {
        fn new(device: Device) -> Self {
            let (gate, observer) = PollGate::create();
            Self {
                gate,
                correlator: Correlator::new(observer, DecodeLevel::nothing()),
                device,
            }
        }

        fn poll(&mut self, bank: RegisterBank, start: u16, count: u16) {
            let range = AddressRange::try_from(start, count).unwrap();
            let request = ReadRequest::new(self.device.unit_id(), bank, range);
            self.gate.begin(self.device.clone(), request);
        }

        fn value(&self, name: &str) -> Option<Value> {
            self.device.point(name).unwrap().value
        }
    }

    fn meter() -> Device {
        let device = Device::new("meter", UnitId::new(1));
        device.add_point(holding("a", 100, ValueType::U16));
        device.add_point(holding("b", 101, ValueType::U16));
        device.add_point(holding("ab", 100, ValueType::U32));
        device
    }

    #[tokio::test(start_paused = true)]
    async fn decodes_points_covered_by_the_request() {
        let mut fixture = Fixture::new(meter());
        fixture.poll(RegisterBank::Holding, 100, 2);

        let frame = response(0x01, 0x03, &[0x00, 0x2A, 0x00, 0x01]);
        assert_eq!(fixture.correlator.process(&frame), Ok(()));

        assert_eq!(fixture.value("a"), Some(Value::U16(42)));
        assert_eq!(fixture.value("b"), Some(Value::U16(1)));
        assert_eq!(fixture.value("ab"), Some(Value::U32(0x002A_0001)));
        assert!(fixture.device.point("a").unwrap().updated.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn correlated_response_releases_the_gate() {
        let mut fixture = Fixture::new(meter());
        // consume the initial permit
        assert!(fixture.gate.wait(std::time::Duration::from_millis(1)).await);

        fixture.poll(RegisterBank::Holding, 100, 2);
        let frame = response(0x01, 0x03, &[0x00, 0x2A, 0x00, 0x01]);
        fixture.correlator.process(&frame).unwrap();
        assert!(fixture.gate.wait(std::time::Duration::from_millis(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_mismatches_without_touching_points() {
        let mut fixture = Fixture::new(meter());
        assert!(fixture.gate.wait(std::time::Duration::from_millis(1)).await);
        fixture.poll(RegisterBank::Holding, 100, 2);

        let payload = [0x00, 0x2A, 0x00, 0x01];
        assert_eq!(
            fixture.correlator.process(&response(0x02, 0x03, &payload)),
            Err(FrameError::UnitIdMismatch(UnitId::new(1), UnitId::new(2)))
        );
        assert_eq!(
            fixture.correlator.process(&response(0x01, 0x04, &payload)),
            Err(FrameError::FunctionMismatch(0x03, 0x04))
        );
        assert_eq!(
            fixture.correlator.process(&response(0x01, 0x06, &payload)),
            Err(FrameError::FunctionMismatch(0x03, 0x06))
        );
        assert_eq!(
            fixture.correlator.process(&response(0x01, 0x03, &payload[..2])),
            Err(FrameError::CountMismatch(2, 2))
        );

        for name in ["a", "b", "ab"] {
            assert_eq!(fixture.value(name), None);
        }
        assert!(!fixture.gate.wait(std::time::Duration::from_millis(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_frames_that_fail_validation() {
        let mut fixture = Fixture::new(meter());
        fixture.poll(RegisterBank::Holding, 100, 2);

        assert_eq!(fixture.correlator.process(&[]), Err(FrameError::TooShort(0)));
        assert!(matches!(
            fixture.correlator.process(&[0x01]),
            Err(FrameError::TooShort(1))
        ));

        let mut frame = response(0x01, 0x03, &[0x00, 0x2A, 0x00, 0x01]);
        frame[4] ^= 0x01;
        assert!(matches!(
            fixture.correlator.process(&frame),
            Err(FrameError::CrcMismatch(_, _))
        ));

        // byte count claims more than is present
        let mut frame = vec![0x01, 0x03, 0x06, 0x00, 0x2A, 0x00, 0x01];
        crc::append_checksum(&mut frame);
        assert_eq!(
            fixture.correlator.process(&frame),
            Err(FrameError::ByteCountMismatch(6, 4))
        );

        assert_eq!(fixture.value("a"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn exception_responses_are_rejected() {
        let mut fixture = Fixture::new(meter());
        fixture.poll(RegisterBank::Holding, 100, 2);

        let mut frame = vec![0x01, 0x83, 0x02];
        crc::append_checksum(&mut frame);
        assert_eq!(
            fixture.correlator.process(&frame),
            Err(FrameError::Exception(ExceptionCode::IllegalDataAddress))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn frames_without_an_outstanding_request_are_rejected() {
        let mut fixture = Fixture::new(meter());
        let frame = response(0x01, 0x03, &[0x00, 0x2A, 0x00, 0x01]);
        assert_eq!(
            fixture.correlator.process(&frame),
            Err(FrameError::NoOutstandingRequest)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn only_points_of_the_matching_bank_are_updated() {
        let device = meter();
        device.add_point(
            MeasurementPoint::new("input", 100, RegisterBank::Input, ValueType::U16).unwrap(),
        );
        let mut fixture = Fixture::new(device);
        fixture.poll(RegisterBank::Input, 100, 1);

        let frame = response(0x01, 0x04, &[0x12, 0x34]);
        assert_eq!(fixture.correlator.process(&frame), Ok(()));
        assert_eq!(fixture.value("input"), Some(Value::U16(0x1234)));
        assert_eq!(fixture.value("a"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn points_straddling_the_range_are_not_decoded() {
        let mut fixture = Fixture::new(meter());
        fixture.poll(RegisterBank::Holding, 101, 1);

        let frame = response(0x01, 0x03, &[0x00, 0x07]);
        assert_eq!(fixture.correlator.process(&frame), Ok(()));
        assert_eq!(fixture.value("b"), Some(Value::U16(7)));
        assert_eq!(fixture.value("a"), None);
        assert_eq!(fixture.value("ab"), None);
    }

    #[test]
    fn floats_are_rounded_to_two_decimals() {
        let bytes = 3.14159f32.to_be_bytes();
        assert_eq!(
            decode_value(ValueType::F32, ByteOrder::Abcd, &bytes),
            Some(Value::F32(3.14))
        );

        let bytes = 2.5f64.to_be_bytes();
        assert_eq!(
            decode_value(ValueType::F64, ByteOrder::Abcd, &bytes),
            Some(Value::F64(2.5))
        );

        // doubles are not rounded
        let bytes = 1.23456f64.to_be_bytes();
        assert_eq!(
            decode_value(ValueType::F64, ByteOrder::Abcd, &bytes),
            Some(Value::F64(1.23456))
        );
    }

    #[test]
    fn decodes_signed_and_wide_integers() {
        assert_eq!(
            decode_value(ValueType::I16, ByteOrder::Abcd, &[0xFF, 0xFE]),
            Some(Value::I16(-2))
        );
        assert_eq!(
            decode_value(ValueType::I32, ByteOrder::Abcd, &[0xFF, 0xFF, 0xFF, 0xFF]),
            Some(Value::I32(-1))
        );
        assert_eq!(
            decode_value(
                ValueType::U64,
                ByteOrder::Abcd,
                &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
            ),
            Some(Value::U64(0x0102_0304_0506_0708))
        );
        assert_eq!(
            decode_value(ValueType::I64, ByteOrder::Abcd, &[0xFF; 8]),
            Some(Value::I64(-1))
        );
    }

    #[test]
    fn applies_the_device_byte_order() {
        assert_eq!(
            decode_value(ValueType::U32, ByteOrder::Cdab, &[0x00, 0x01, 0x00, 0x2A]),
            Some(Value::U32(0x002A_0001))
        );
        assert_eq!(
            decode_value(ValueType::U32, ByteOrder::Dcba, &[0x01, 0x00, 0x2A, 0x00]),
            Some(Value::U32(0x002A_0001))
        );
        assert_eq!(
            decode_value(ValueType::U16, ByteOrder::Badc, &[0x2A, 0x00]),
            Some(Value::U16(42))
        );
    }

    #[test]
    fn hex_points_keep_the_raw_word() {
        assert_eq!(
            decode_value(ValueType::Hex, ByteOrder::Dcba, &[0x0A, 0xFF]),
            Some(Value::Hex(vec![0x0A, 0xFF]))
        );
    }
}
