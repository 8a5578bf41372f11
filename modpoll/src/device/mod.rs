use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::device::plan::{PlanLimits, RequestPlan};
use crate::error::InvalidPoint;
use crate::types::{AddressRange, ByteOrder, RegisterBank, UnitId, Value, ValueType};

pub(crate) mod plan;

/// A named, typed value located at a register address of a device
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MeasurementPoint {
    name: String,
    address: u16,
    bank: RegisterBank,
    value_type: ValueType,
}

/// Point definition together with the last value decoded for it
#[derive(Clone, Debug, PartialEq)]
pub struct PointSnapshot {
    /// definition of the point
    pub point: MeasurementPoint,
    /// last decoded value, `None` until the first correlated response
    pub value: Option<Value>,
    /// time of the last update
    pub updated: Option<SystemTime>,
}

/// A slave device polled by a single poller
///
/// `Device` is a cheap handle, clones refer to the same device. Points may be added and
/// removed while the device is being polled. The request plan is rebuilt on the next poll.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    name: String,
    unit_id: UnitId,
    byte_order: ByteOrder,
    enabled: AtomicBool,
    state: Mutex<DeviceState>,
}

#[derive(Default)]
struct DeviceState {
    points: Vec<PointState>,
    plan: Option<CachedPlan>,
}

struct PointState {
    point: MeasurementPoint,
    value: Option<Value>,
    updated: Option<SystemTime>,
}

struct CachedPlan {
    limits: PlanLimits,
    plan: Arc<RequestPlan>,
}

impl MeasurementPoint {
    /// Define a point, failing if its last word lies beyond address 0xFFFF
    pub fn new(
        name: impl Into<String>,
        address: u16,
        bank: RegisterBank,
        value_type: ValueType,
    ) -> Result<Self, InvalidPoint> {
        let words = value_type.word_width();
        if address.checked_add(words - 1).is_none() {
            return Err(InvalidPoint::AddressOverflow { address, words });
        }

        Ok(Self {
            name: name.into(),
            address,
            bank,
            value_type,
        })
    }

    /// name of the point, unique within a device
    pub fn name(&self) -> &str {
        &self.name
    }

    /// address of the first word
    pub fn address(&self) -> u16 {
        self.address
    }

    /// bank the point is read from
    pub fn bank(&self) -> RegisterBank {
        self.bank
    }

    /// how the words are decoded
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// address of the last word occupied by the point
    pub fn last_word_address(&self) -> u16 {
        // checked at construction
        self.address + (self.value_type.word_width() - 1)
    }

    pub(crate) fn is_inside(&self, range: &AddressRange) -> bool {
        range.contains(self.address, self.last_word_address())
    }
}

impl std::fmt::Display for MeasurementPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} ({:?} {} {:?})",
            self.name, self.bank, self.address, self.value_type
        )
    }
}

impl std::fmt::Display for PointSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} = {}", self.point, value),
            None => write!(f, "{} = ---", self.point),
        }
    }
}

impl PointState {
    fn snapshot(&self) -> PointSnapshot {
        PointSnapshot {
            point: self.point.clone(),
            value: self.value.clone(),
            updated: self.updated,
        }
    }
}

impl DeviceState {
    fn invalidate(&mut self) {
        self.plan = None;
    }
}

impl Device {
    /// Create a device that transmits multi-word values big-endian
    pub fn new(name: impl Into<String>, unit_id: UnitId) -> Self {
        Self::with_byte_order(name, unit_id, ByteOrder::default())
    }

    /// Create a device that transmits multi-word values in the given byte order
    pub fn with_byte_order(
        name: impl Into<String>,
        unit_id: UnitId,
        byte_order: ByteOrder,
    ) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                name: name.into(),
                unit_id,
                byte_order,
                enabled: AtomicBool::new(true),
                state: Mutex::new(DeviceState::default()),
            }),
        }
    }

    /// name of the device
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// unit id the device responds to
    pub fn unit_id(&self) -> UnitId {
        self.inner.unit_id
    }

    /// byte order of multi-word values
    pub fn byte_order(&self) -> ByteOrder {
        self.inner.byte_order
    }

    /// true if the device is included in poll cycles
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Include or exclude the device from poll cycles
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Add a point, replacing any existing point of the same name
    pub fn add_point(&self, point: MeasurementPoint) {
        let mut state = self.inner.state.lock();
        let entry = PointState {
            point,
            value: None,
            updated: None,
        };
        match state
            .points
            .iter_mut()
            .find(|x| x.point.name == entry.point.name)
        {
            Some(existing) => *existing = entry,
            None => state.points.push(entry),
        }
        state.invalidate();
    }

    /// Remove the named point, returning true if it existed
    pub fn remove_point(&self, name: &str) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.points.len();
        state.points.retain(|x| x.point.name != name);
        let removed = state.points.len() != before;
        if removed {
            state.invalidate();
        }
        removed
    }

    /// Replace every point of the device
    pub fn set_points(&self, points: impl IntoIterator<Item = MeasurementPoint>) {
        let entries: Vec<PointState> = points
            .into_iter()
            .map(|point| PointState {
                point,
                value: None,
                updated: None,
            })
            .collect();
        let mut state = self.inner.state.lock();
        state.points = entries;
        state.invalidate();
    }

    /// Snapshot of every point in the order they were added
    pub fn points(&self) -> Vec<PointSnapshot> {
        self.inner
            .state
            .lock()
            .points
            .iter()
            .map(PointState::snapshot)
            .collect()
    }

    /// Snapshot of a single point
    pub fn point(&self, name: &str) -> Option<PointSnapshot> {
        self.inner
            .state
            .lock()
            .points
            .iter()
            .find(|x| x.point.name == name)
            .map(PointState::snapshot)
    }

    /// The read requests covering every point of the device
    ///
    /// The plan is cached and only rebuilt after the point set or the limits change.
    pub fn request_plan(&self, limits: PlanLimits) -> Arc<RequestPlan> {
        let mut state = self.inner.state.lock();
        if let Some(cached) = &state.plan {
            if cached.limits == limits {
                return cached.plan.clone();
            }
        }

        let points: Vec<MeasurementPoint> = state.points.iter().map(|x| x.point.clone()).collect();
        let plan = Arc::new(RequestPlan::build(self.inner.unit_id, &points, limits));
        tracing::debug!(
            "device {}: planned {} request(s) for {} point(s)",
            self.inner.name,
            plan.len(),
            points.len()
        );
        state.plan = Some(CachedPlan {
            limits,
            plan: plan.clone(),
        });
        plan
    }

    /// Store a value for every point of `bank` lying fully inside `range`
    ///
    /// `decode` is invoked once per matching point and returns `None` if the point can't be
    /// decoded. Returns the updated points.
    pub(crate) fn update_points<F>(
        &self,
        bank: RegisterBank,
        range: AddressRange,
        mut decode: F,
    ) -> Vec<(MeasurementPoint, Value)>
    where
        F: FnMut(&MeasurementPoint) -> Option<Value>,
    {
        let now = SystemTime::now();
        let mut updated = Vec::new();
        let mut state = self.inner.state.lock();
        for entry in state
            .points
            .iter_mut()
            .filter(|x| x.point.bank == bank && x.point.is_inside(&range))
        {
            if let Some(value) = decode(&entry.point) {
                entry.value = Some(value.clone());
                entry.updated = Some(now);
                updated.push((entry.point.clone(), value));
            }
        }
        updated
    }

    pub(crate) fn ptr_eq(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.inner.name)
            .field("unit_id", &self.inner.unit_id)
            .field("byte_order", &self.inner.byte_order)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
