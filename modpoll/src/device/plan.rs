use crate::common::crc;
use crate::common::frame::Frame;
use crate::constants::limits::{MAX_SINGLE_SPAN, SPLIT_CHUNK_COUNT, SPLIT_OVERLAP};
use crate::device::MeasurementPoint;
use crate::types::{AddressRange, RegisterBank, UnitId};

/// Limits applied when coalescing the points of a device into read requests
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialization", serde(default))]
pub struct PlanLimits {
    /// An interval whose span (last - first) is below this value is read with a single request
    pub max_span: u16,
    /// Number of words read by each chunk of a split interval
    pub chunk_count: u16,
    /// Number of words shared by consecutive chunks so that no point straddles a boundary
    pub overlap: u16,
}

/// A single read request of a plan and its serialized frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadRequest {
    /// unit the request is addressed to
    pub unit_id: UnitId,
    /// bank being read, which determines the function code
    pub bank: RegisterBank,
    /// registers being read
    pub range: AddressRange,
    /// the request as written to the wire
    pub frame: Frame,
}

/// Ordered read requests covering every point of a device
///
/// Holding register requests come first, followed by input register requests. This is the
/// order in which the device is polled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestPlan {
    requests: Vec<ReadRequest>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Interval {
    first: u32,
    last: u32,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            max_span: MAX_SINGLE_SPAN,
            chunk_count: SPLIT_CHUNK_COUNT,
            overlap: SPLIT_OVERLAP,
        }
    }
}

impl PlanLimits {
    // a chunk may never read past the interval it splits and the cursor must always advance
    fn chunk(&self) -> u32 {
        (self.chunk_count as u32).clamp(1, self.max_span as u32 + 1)
    }

    fn step(&self) -> u32 {
        self.chunk().saturating_sub(self.overlap as u32).max(1)
    }
}

impl ReadRequest {
    pub(crate) fn new(unit_id: UnitId, bank: RegisterBank, range: AddressRange) -> Self {
        let mut bytes = Vec::with_capacity(crate::constants::frame::READ_REQUEST_LENGTH);
        bytes.push(unit_id.value);
        bytes.push(bank.function_code());
        bytes.extend_from_slice(&range.start.to_be_bytes());
        bytes.extend_from_slice(&range.count.to_be_bytes());
        crc::append_checksum(&mut bytes);

        Self {
            unit_id,
            bank,
            range,
            frame: Frame::new(bytes),
        }
    }
}

impl std::fmt::Display for ReadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "unit: {} {} {}", self.unit_id, self.bank, self.range)
    }
}

impl RequestPlan {
    pub(crate) fn build(unit_id: UnitId, points: &[MeasurementPoint], limits: PlanLimits) -> Self {
        let mut requests = Vec::new();
        for bank in [RegisterBank::Holding, RegisterBank::Input] {
            for interval in coalesce(points.iter().filter(|p| p.bank() == bank)) {
                split(interval, limits, |range| {
                    requests.push(ReadRequest::new(unit_id, bank, range))
                });
            }
        }
        Self { requests }
    }

    /// Requests in polling order
    pub fn requests(&self) -> &[ReadRequest] {
        &self.requests
    }

    /// Iterate over the requests in polling order
    pub fn iter(&self) -> std::slice::Iter<'_, ReadRequest> {
        self.requests.iter()
    }

    /// Number of requests in the plan
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// true if the device has no points to read
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl<'a> IntoIterator for &'a RequestPlan {
    type Item = &'a ReadRequest;
    type IntoIter = std::slice::Iter<'a, ReadRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// sweep the points in address order, merging each one into the last interval unless
/// it starts more than one word past its end
fn coalesce<'a>(points: impl Iterator<Item = &'a MeasurementPoint>) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = points
        .map(|p| Interval {
            first: p.address() as u32,
            last: p.last_word_address() as u32,
        })
        .collect();
    sorted.sort_by_key(|x| (x.first, x.last));

    let mut intervals: Vec<Interval> = Vec::new();
    for next in sorted {
        match intervals.last_mut() {
            Some(last) if last.last + 1 >= next.first => {
                last.last = last.last.max(next.last);
            }
            _ => intervals.push(next),
        }
    }
    intervals
}

fn split(interval: Interval, limits: PlanLimits, mut emit: impl FnMut(AddressRange)) {
    let Interval { first, last } = interval;
    let max_span = limits.max_span as u32;

    if last - first < max_span {
        emit_range(first, last, &mut emit);
        return;
    }

    let chunk = limits.chunk();
    let step = limits.step();
    let mut cursor = first;
    while cursor <= last && last - cursor >= max_span {
        emit_range(cursor, cursor + chunk - 1, &mut emit);
        cursor += step;
    }
    if cursor <= last {
        emit_range(cursor, last, &mut emit);
    }
}

fn emit_range(first: u32, last: u32, emit: &mut impl FnMut(AddressRange)) {
    // both ends come from validated u16 point addresses
    let (Ok(start), Ok(count)) = (u16::try_from(first), u16::try_from(last - first + 1)) else {
        tracing::warn!("skipping unrepresentable range [{}, {}]", first, last);
        return;
    };
    match AddressRange::try_from(start, count) {
        Ok(range) => emit(range),
        Err(err) => tracing::warn!("skipping range: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;

    fn point(address: u16, bank: RegisterBank, value_type: ValueType) -> MeasurementPoint {
        MeasurementPoint::new(format!("p{address}"), address, bank, value_type).unwrap()
    }

    fn holding(address: u16, value_type: ValueType) -> MeasurementPoint {
        point(address, RegisterBank::Holding, value_type)
    }

    fn ranges(plan: &RequestPlan) -> Vec<(RegisterBank, u16, u16)> {
        plan.iter()
            .map(|r| (r.bank, r.range.start, r.range.count))
            .collect()
    }

    fn build(points: &[MeasurementPoint]) -> RequestPlan {
        RequestPlan::build(UnitId::new(1), points, PlanLimits::default())
    }

    #[test]
    fn empty_point_set_yields_empty_plan() {
        assert!(build(&[]).is_empty());
    }

    #[test]
    fn serializes_request_frames() {
        let plan = build(&[holding(100, ValueType::U32)]);
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.requests()[0].frame.as_bytes(),
            &[0x01, 0x03, 0x00, 0x64, 0x00, 0x02, 0x85, 0xD4]
        );
        assert!(plan.requests()[0].frame.is_valid());
    }

    #[test]
    fn merges_adjacent_and_overlapping_points() {
        let plan = build(&[
            holding(10, ValueType::U32), // [10, 11]
            holding(12, ValueType::U16), // adjacent
            holding(11, ValueType::U16), // inside
            holding(13, ValueType::F64), // [13, 16]
        ]);
        assert_eq!(ranges(&plan), vec![(RegisterBank::Holding, 10, 7)]);
    }

    #[test]
    fn a_one_word_gap_opens_a_new_interval() {
        let plan = build(&[holding(0, ValueType::U32), holding(3, ValueType::U16)]);
        assert_eq!(
            ranges(&plan),
            vec![(RegisterBank::Holding, 0, 2), (RegisterBank::Holding, 3, 1)]
        );
    }

    #[test]
    fn holding_requests_precede_input_requests() {
        let plan = build(&[
            point(5, RegisterBank::Input, ValueType::U16),
            holding(500, ValueType::U16),
            point(1, RegisterBank::Input, ValueType::U16),
            holding(7, ValueType::I16),
        ]);
        assert_eq!(
            ranges(&plan),
            vec![
                (RegisterBank::Holding, 7, 1),
                (RegisterBank::Holding, 500, 1),
                (RegisterBank::Input, 1, 1),
                (RegisterBank::Input, 5, 1),
            ]
        );
        assert_eq!(plan.requests()[2].frame.as_bytes()[1], 0x04);
    }

    fn contiguous(last: u16) -> Vec<MeasurementPoint> {
        (0..=last).map(|a| holding(a, ValueType::U16)).collect()
    }

    #[test]
    fn spans_below_the_limit_use_one_request() {
        // [0, 99] spans 99
        let plan = build(&contiguous(99));
        assert_eq!(ranges(&plan), vec![(RegisterBank::Holding, 0, 100)]);

        // a wide point closing the interval counts by its last word
        let plan = build(&[holding(0, ValueType::U16), holding(1, ValueType::U64)]);
        assert_eq!(ranges(&plan), vec![(RegisterBank::Holding, 0, 5)]);
    }

    #[test]
    fn a_span_of_one_hundred_is_split() {
        // [0, 100] spans 100
        let plan = build(&contiguous(100));
        assert_eq!(
            ranges(&plan),
            vec![
                (RegisterBank::Holding, 0, 62),
                (RegisterBank::Holding, 58, 43),
            ]
        );
    }

    #[test]
    fn long_intervals_are_split_with_overlap() {
        // [0, 199]
        let points: Vec<_> = (0..200).map(|a| holding(a, ValueType::U16)).collect();
        let plan = build(&points);
        assert_eq!(
            ranges(&plan),
            vec![
                (RegisterBank::Holding, 0, 62),
                (RegisterBank::Holding, 58, 62),
                (RegisterBank::Holding, 116, 84),
            ]
        );
    }

    #[test]
    fn split_covers_the_interval_and_consecutive_chunks_overlap_by_four() {
        for last in [100u16, 101, 157, 158, 400, 1000] {
            let plan = build(&contiguous(last));
            let requests = plan.requests();
            assert!(requests.len() >= 2, "span {last}");
            assert_eq!(requests[0].range.start, 0);
            assert_eq!(requests.last().unwrap().range.last(), last);

            for pair in requests.windows(2) {
                let (a, b) = (pair[0].range, pair[1].range);
                assert!(b.start <= a.last(), "span {last}: gap after {a}");
                assert_eq!(a.last() + 1 - b.start, 4, "span {last}");
                assert!(b.last() >= a.last());
            }
        }
    }

    #[test]
    fn every_point_is_fully_inside_some_request() {
        let points: Vec<_> = (0..60)
            .map(|i| holding(i * 4 + 1, ValueType::F64))
            .collect();
        let plan = build(&points);
        for p in &points {
            assert!(
                plan.iter()
                    .any(|r| r.range.contains(p.address(), p.last_word_address())),
                "{} not covered",
                p.address()
            );
        }
    }

    #[test]
    fn planning_is_idempotent() {
        let points = vec![
            holding(300, ValueType::U64),
            holding(0, ValueType::U16),
            point(20, RegisterBank::Input, ValueType::F32),
        ];
        assert_eq!(build(&points), build(&points));
    }

    #[test]
    fn points_at_the_top_of_the_register_space_are_planned() {
        let plan = build(&[holding(0xFFFC, ValueType::U64)]);
        assert_eq!(ranges(&plan), vec![(RegisterBank::Holding, 0xFFFC, 4)]);
    }

    #[test]
    fn custom_limits_are_respected() {
        let limits = PlanLimits {
            max_span: 10,
            chunk_count: 6,
            overlap: 2,
        };
        let points: Vec<_> = (0..20).map(|a| holding(a, ValueType::U16)).collect();
        let plan = RequestPlan::build(UnitId::new(7), &points, limits);
        assert_eq!(
            ranges(&plan),
            vec![
                (RegisterBank::Holding, 0, 6),
                (RegisterBank::Holding, 4, 6),
                (RegisterBank::Holding, 8, 6),
                (RegisterBank::Holding, 12, 8),
            ]
        );
    }
}
