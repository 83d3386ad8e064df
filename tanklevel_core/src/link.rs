//! Connectivity supervision.
//!
//! Small state machine over the two-phase transport: the link (wireless
//! association) must be up before a session (authenticated pub/sub channel)
//! can exist. Startup failures are unrecoverable and escalate to the caller;
//! mid-operation failures are retried lazily, one bounded attempt per
//! `ensure_ready` call, only when a publish is actually due.

use crate::error::{Result, TankError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tanklevel_traits::{Clock, NetworkLink, SessionOpts};

/// Connectivity progress. Owned exclusively by the supervisor; read-only
/// elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    LinkUp,
    SessionUp,
}

/// Everything needed to open and keep a session.
#[derive(Debug, Clone)]
pub struct LinkCfg {
    pub link_timeout_ms: u64,
    /// Minimum spacing between failed reconnection attempts (ms).
    pub reconnect_delay_ms: u64,
    pub client_id: String,
    pub username: String,
    pub password: String,
    /// Telemetry topic; liveness announcements go to `<topic>/status`.
    pub topic: String,
}

/// Retained liveness announcement published right after session setup.
pub const STATUS_ONLINE: &[u8] = br#"{"status":"online"}"#;
/// Last-will payload the broker delivers on unclean disconnect.
pub const STATUS_OFFLINE: &[u8] = br#"{"status":"offline"}"#;

pub struct LinkSupervisor<N: NetworkLink> {
    link: N,
    cfg: LinkCfg,
    status_topic: String,
    state: LinkState,
    last_attempt_ms: u64,
    retry_count: u32,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

impl<N: NetworkLink> LinkSupervisor<N> {
    pub fn new(link: N, cfg: LinkCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        let status_topic = format!("{}/status", cfg.topic);
        Self {
            link,
            cfg,
            status_topic,
            state: LinkState::Disconnected,
            last_attempt_ms: 0,
            retry_count: 0,
            clock,
            epoch,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_attempt_ms(&self) -> u64 {
        self.last_attempt_ms
    }

    /// Per-iteration client keepalive.
    pub fn tick(&mut self) {
        self.link.poll();
    }

    /// Startup connection. An `Err` here means the node cannot come up and
    /// should restart after its cooldown; the supervisor itself never loops.
    pub fn connect(&mut self) -> Result<()> {
        self.note_attempt();
        tracing::info!(timeout_ms = self.cfg.link_timeout_ms, "establishing link");
        if !self
            .link
            .establish_link(Duration::from_millis(self.cfg.link_timeout_ms))
        {
            return Err(eyre::Report::new(TankError::FatalLink(
                "link establishment timed out",
            )));
        }
        self.state = LinkState::LinkUp;
        if !self.open_session() {
            return Err(eyre::Report::new(TankError::FatalLink(
                "session establishment refused",
            )));
        }
        Ok(())
    }

    /// True iff the session is usable after at most one reconnection attempt.
    /// Never blocks longer than one link timeout; after a failed attempt,
    /// further attempts are suppressed until `reconnect_delay_ms` has passed.
    pub fn ensure_ready(&mut self) -> bool {
        if self.state == LinkState::SessionUp && self.link.is_session_alive() {
            return true;
        }

        let now = self.clock.ms_since(self.epoch);
        if self.retry_count > 0
            && now.saturating_sub(self.last_attempt_ms) < self.cfg.reconnect_delay_ms
        {
            tracing::debug!("reconnect attempt suppressed inside the delay window");
            return false;
        }

        // Session is gone; find out how far down the stack we fell.
        self.state = if self.link.is_link_up() {
            LinkState::LinkUp
        } else {
            LinkState::Disconnected
        };
        self.note_attempt();

        if self.state == LinkState::Disconnected {
            tracing::warn!("link down, re-establishing");
            if !self
                .link
                .establish_link(Duration::from_millis(self.cfg.link_timeout_ms))
            {
                return false;
            }
            self.state = LinkState::LinkUp;
        }

        if self.open_session() {
            true
        } else {
            tracing::warn!(retries = self.retry_count, "session re-establishment failed");
            false
        }
    }

    /// Session setup from `LinkUp`: credentials, identity, last-will
    /// registration, then the retained online announcement.
    fn open_session(&mut self) -> bool {
        debug_assert_eq!(self.state, LinkState::LinkUp);
        let opts = SessionOpts {
            client_id: &self.cfg.client_id,
            username: &self.cfg.username,
            password: &self.cfg.password,
            will_topic: &self.status_topic,
            will_payload: STATUS_OFFLINE,
        };
        if !self.link.establish_session(&opts) {
            return false;
        }
        self.state = LinkState::SessionUp;
        self.retry_count = 0;
        if !self.link.publish(&self.status_topic, STATUS_ONLINE, true) {
            tracing::warn!("online announcement publish failed");
        }
        tracing::info!(client_id = %self.cfg.client_id, "session up");
        true
    }

    fn note_attempt(&mut self) {
        self.last_attempt_ms = self.clock.ms_since(self.epoch);
        self.retry_count = self.retry_count.saturating_add(1);
    }

    /// Fire-and-forget publish on the telemetry topic.
    pub fn publish(&mut self, payload: &[u8], retain: bool) -> bool {
        self.link.publish(&self.cfg.topic, payload, retain)
    }

    pub fn link_quality(&self) -> i32 {
        self.link.link_quality()
    }
}
