//! Capability implementations: simulated backends (always available) and
//! real GPIO drivers behind the `hardware` feature.

pub mod error;
#[cfg(feature = "hardware")]
pub mod sr04;
#[cfg(feature = "hardware")]
pub mod yfs201;

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tanklevel_traits::{BoxError, NetworkLink, PulseCounter, Ranger, SessionOpts};

/// Speed of sound at ambient temperature, cm per microsecond.
const SPEED_OF_SOUND_CM_PER_US: f32 = 0.0343;

/// Simulated ranger; the distance is shared through a handle so scenarios
/// can move the water surface mid-run.
pub struct SimulatedRanger {
    distance_cm: Rc<Cell<f32>>,
}

#[derive(Clone)]
pub struct RangerHandle(Rc<Cell<f32>>);

impl RangerHandle {
    pub fn set_distance_cm(&self, cm: f32) {
        self.0.set(cm);
    }
    pub fn distance_cm(&self) -> f32 {
        self.0.get()
    }
}

impl SimulatedRanger {
    pub fn new(initial_cm: f32) -> Self {
        Self {
            distance_cm: Rc::new(Cell::new(initial_cm)),
        }
    }

    pub fn handle(&self) -> RangerHandle {
        RangerHandle(self.distance_cm.clone())
    }
}

impl Ranger for SimulatedRanger {
    fn trigger_and_measure(&mut self) -> Result<u32, BoxError> {
        let cm = self.distance_cm.get();
        if !cm.is_finite() || cm <= 0.0 {
            // Nothing to echo from; report a timeout.
            return Ok(0);
        }
        let echo_us = (cm * 2.0 / SPEED_OF_SOUND_CM_PER_US).round();
        tracing::trace!(distance_cm = cm, echo_us, "ranging (simulated)");
        Ok(echo_us as u32)
    }
}

/// Simulated pulse counter. `PulseSource` plays the interrupt role; the
/// counter side drains with an atomic swap, the same discipline the real
/// driver uses.
pub struct SimulatedPulseCounter {
    count: Arc<AtomicU32>,
}

#[derive(Clone)]
pub struct PulseSource(Arc<AtomicU32>);

impl PulseSource {
    pub fn pulse(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
    pub fn pulses(&self, n: u32) {
        self.0.fetch_add(n, Ordering::AcqRel);
    }
}

impl SimulatedPulseCounter {
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn source(&self) -> PulseSource {
        PulseSource(self.count.clone())
    }
}

impl Default for SimulatedPulseCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseCounter for SimulatedPulseCounter {
    fn read_and_reset(&mut self) -> Result<u32, BoxError> {
        Ok(self.count.swap(0, Ordering::AcqRel))
    }
}

/// Simulated transport: associates on request, with optional scripted
/// refusals for outage scenarios. Published frames are logged and recorded.
pub struct SimulatedLink {
    link_up: bool,
    session_alive: bool,
    fail_next_links: u32,
    fail_next_sessions: u32,
    rssi_dbm: i32,
    published: Vec<(String, Vec<u8>, bool)>,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self {
            link_up: false,
            session_alive: false,
            fail_next_links: 0,
            fail_next_sessions: 0,
            rssi_dbm: -61,
            published: Vec::new(),
        }
    }

    pub fn with_rssi(mut self, rssi_dbm: i32) -> Self {
        self.rssi_dbm = rssi_dbm;
        self
    }

    /// Refuse the next `n` link establishment attempts.
    pub fn fail_next_links(&mut self, n: u32) {
        self.fail_next_links = n;
    }

    /// Refuse the next `n` session establishment attempts.
    pub fn fail_next_sessions(&mut self, n: u32) {
        self.fail_next_sessions = n;
    }

    pub fn drop_session(&mut self) {
        self.session_alive = false;
    }

    pub fn drop_link(&mut self) {
        self.link_up = false;
        self.session_alive = false;
    }

    pub fn published(&self) -> &[(String, Vec<u8>, bool)] {
        &self.published
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkLink for SimulatedLink {
    fn establish_link(&mut self, _timeout: Duration) -> bool {
        if self.fail_next_links > 0 {
            self.fail_next_links -= 1;
            return false;
        }
        self.link_up = true;
        true
    }

    fn establish_session(&mut self, opts: &SessionOpts<'_>) -> bool {
        if !self.link_up {
            return false;
        }
        if self.fail_next_sessions > 0 {
            self.fail_next_sessions -= 1;
            return false;
        }
        tracing::debug!(client_id = opts.client_id, "session up (simulated)");
        self.session_alive = true;
        true
    }

    fn is_link_up(&self) -> bool {
        self.link_up
    }

    fn is_session_alive(&self) -> bool {
        self.session_alive
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        if !self.session_alive {
            return false;
        }
        tracing::info!(
            topic,
            payload = %String::from_utf8_lossy(payload),
            "publish (simulated)"
        );
        self.published.push((topic.to_owned(), payload.to_vec(), retain));
        true
    }

    fn poll(&mut self) {}

    fn link_quality(&self) -> i32 {
        self.rssi_dbm
    }
}
