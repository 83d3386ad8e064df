pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

/// Boxed error type used at the hardware seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One trigger/echo ranging cycle.
///
/// `Ok(0)` means the echo timed out; any other value is the measured echo
/// duration in microseconds. `Err` is reserved for genuine hardware faults
/// (GPIO access failure), not for timeouts.
pub trait Ranger {
    fn trigger_and_measure(&mut self) -> Result<u32, BoxError>;
}

/// Pulse accumulator fed by an asynchronous edge-triggered source.
///
/// `read_and_reset` must read and clear the count as one step with the
/// increment source excluded (atomic swap, or a masked interrupt); pulses
/// arriving inside that window are the accepted approximation error.
pub trait PulseCounter {
    fn read_and_reset(&mut self) -> Result<u32, BoxError>;
}

/// Session parameters handed to the transport when opening the
/// publish/subscribe channel.
#[derive(Debug, Clone, Copy)]
pub struct SessionOpts<'a> {
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    /// Topic the broker publishes on the node's behalf on unclean disconnect.
    pub will_topic: &'a str,
    pub will_payload: &'a [u8],
}

/// Two-phase connectivity: `establish_link` is the lower transport
/// association, `establish_session` the authenticated pub/sub channel on top.
///
/// Methods report success/failure as booleans; the capability owns its own
/// diagnostics. None of them may block longer than the passed timeout.
pub trait NetworkLink {
    fn establish_link(&mut self, timeout: Duration) -> bool;
    fn establish_session(&mut self, opts: &SessionOpts<'_>) -> bool;
    fn is_link_up(&self) -> bool;
    fn is_session_alive(&self) -> bool;
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool;
    /// Per-iteration client keepalive; cheap, called every scheduler pass.
    fn poll(&mut self);
    /// Link quality metric (RSSI dBm or equivalent).
    fn link_quality(&self) -> i32;
}

impl<T: Ranger + ?Sized> Ranger for Box<T> {
    fn trigger_and_measure(&mut self) -> Result<u32, BoxError> {
        (**self).trigger_and_measure()
    }
}

impl<T: PulseCounter + ?Sized> PulseCounter for Box<T> {
    fn read_and_reset(&mut self) -> Result<u32, BoxError> {
        (**self).read_and_reset()
    }
}

impl<T: NetworkLink + ?Sized> NetworkLink for Box<T> {
    fn establish_link(&mut self, timeout: Duration) -> bool {
        (**self).establish_link(timeout)
    }
    fn establish_session(&mut self, opts: &SessionOpts<'_>) -> bool {
        (**self).establish_session(opts)
    }
    fn is_link_up(&self) -> bool {
        (**self).is_link_up()
    }
    fn is_session_alive(&self) -> bool {
        (**self).is_session_alive()
    }
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        (**self).publish(topic, payload, retain)
    }
    fn poll(&mut self) {
        (**self).poll()
    }
    fn link_quality(&self) -> i32 {
        (**self).link_quality()
    }
}
