#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core measurement pipeline (hardware-agnostic).
//!
//! All hardware and transport interactions go through the
//! `tanklevel_traits` capabilities (`Ranger`, `PulseCounter`, `NetworkLink`).
//!
//! ## Architecture
//!
//! - **Sampling**: batched ranging with outlier trimming (`sampler` module)
//! - **Level**: pure distance to level/volume conversion (`level` module)
//! - **Flow**: windowed pulse-rate integration (`flow` module)
//! - **Connectivity**: link/session supervision (`link` module)
//! - **Payload**: wire frame assembly (`payload` module)
//! - **Scheduling**: the `TankNode` cooperative loop (this file)
//!
//! The scheduler is a single cooperative loop; the only genuinely concurrent
//! element is the pulse-counting source, which is confined behind the
//! capability's atomic read-and-reset.

// Module declarations
pub mod conversions;
pub mod error;
pub mod flow;
pub mod level;
pub mod link;
pub mod payload;
pub mod sampler;
pub mod util;

use crate::error::{BuildError, Result, TankError};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tanklevel_traits::clock::{Clock, MonotonicClock};
use tanklevel_traits::{NetworkLink, PulseCounter, Ranger};

pub use flow::{FlowCfg, FlowIntegrator};
pub use level::{LevelReading, TankGeometry, compute_level};
pub use link::{LinkCfg, LinkState, LinkSupervisor};
pub use payload::{MAX_PAYLOAD_BYTES, TelemetryPayload, publish_reading};
pub use sampler::{DistanceSampler, SamplerCfg};

/// Pause between scheduler iterations (ms). Short enough to keep the
/// supervisor tick and flow window responsive, long enough not to spin.
const LOOP_PAUSE_MS: u64 = 10;

// Map any boxed hardware error to a typed TankError, with precise handling
// when the hardware crate's typed errors are available.
pub(crate) fn map_hw_error_dyn(e: &(dyn std::error::Error + 'static)) -> TankError {
    #[cfg(feature = "hardware-errors")]
    if let Some(hw) = e.downcast_ref::<tanklevel_hardware::error::HwError>() {
        use tanklevel_hardware::error::HwError;
        return match hw {
            HwError::EchoTimeout => TankError::Timeout,
            other => TankError::HardwareFault(other.to_string()),
        };
    }
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        TankError::Timeout
    } else {
        TankError::Hardware(s)
    }
}

/// Outcome of one scheduler iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleStatus {
    /// Neither timer was due.
    Idle,
    /// A reading was taken and delivered.
    Published(LevelReading),
    /// A read cycle ran but nothing was delivered.
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Zero valid echoes in the batch; a hardware fault, not an empty tank.
    SensorFault,
    /// Session could not be re-established this cycle.
    LinkDown,
    /// Session was up but the transport refused the frame.
    PublishRejected,
}

/// Unified node over concrete capability implementations.
///
/// Owns all mutable run state (timers, supervisor, flow window) so the loop
/// can be unit tested without real hardware.
pub struct TankNode<R: Ranger, N: NetworkLink> {
    sampler: DistanceSampler<R>,
    supervisor: LinkSupervisor<N>,
    flow: Option<FlowIntegrator<Box<dyn PulseCounter>>>,
    geometry: TankGeometry,
    read_interval_ms: u64,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    last_read_ms: u64,
    last_reading: Option<LevelReading>,
}

impl<R: Ranger, N: NetworkLink> core::fmt::Debug for TankNode<R, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TankNode")
            .field("link_state", &self.supervisor.state())
            .field("read_interval_ms", &self.read_interval_ms)
            .field("last_reading", &self.last_reading)
            .finish()
    }
}

impl<R: Ranger, N: NetworkLink> TankNode<R, N> {
    pub fn last_reading(&self) -> Option<LevelReading> {
        self.last_reading
    }

    /// Most recently integrated flow rate, if a flow sensor is built in.
    pub fn last_flow_lpm(&self) -> Option<f32> {
        self.flow.as_ref().and_then(FlowIntegrator::last_rate_lpm)
    }

    pub fn link_state(&self) -> LinkState {
        self.supervisor.state()
    }

    /// Startup connectivity. An `Err` is unrecoverable at this time; the
    /// caller is expected to restart the process after its cooldown.
    pub fn connect(&mut self) -> Result<()> {
        self.supervisor.connect()
    }

    /// Reset timers and drain stale pulses. Call once before the first
    /// `step`.
    pub fn begin(&mut self) -> Result<()> {
        self.epoch = self.clock.now();
        self.last_read_ms = 0;
        self.last_reading = None;
        if let Some(flow) = self.flow.as_mut() {
            flow.begin(0)?;
        }
        Ok(())
    }

    /// One scheduler iteration: keepalive tick, flow window, then the read
    /// cycle when due.
    ///
    /// Within a read cycle, sampling strictly precedes level computation,
    /// which strictly precedes publishing. The flow window is independent
    /// and the rate published alongside a reading is "most recently
    /// computed". Reconnection is attempted lazily, only once a publish is
    /// actually due.
    pub fn step(&mut self) -> Result<CycleStatus> {
        self.supervisor.tick();
        let now = self.clock.ms_since(self.epoch);

        if let Some(flow) = self.flow.as_mut() {
            flow.tick(now)?;
        }

        if now.saturating_sub(self.last_read_ms) < self.read_interval_ms {
            return Ok(CycleStatus::Idle);
        }
        self.last_read_ms = now;

        let Some(distance_cm) = self.sampler.sample()? else {
            tracing::warn!("no valid echo in batch, skipping cycle");
            return Ok(CycleStatus::Skipped(SkipReason::SensorFault));
        };

        let reading = compute_level(distance_cm, &self.geometry);
        self.last_reading = Some(reading);
        if let LevelReading::TooClose { distance_cm } = reading {
            tracing::warn!(distance_cm, "reading below minimum valid distance");
        }
        let flow_lpm = self.last_flow_lpm();

        if !self.supervisor.ensure_ready() {
            tracing::warn!("session unavailable, publish skipped this cycle");
            return Ok(CycleStatus::Skipped(SkipReason::LinkDown));
        }
        if publish_reading(&mut self.supervisor, &reading, flow_lpm)? {
            tracing::debug!(distance_cm, "reading published");
            Ok(CycleStatus::Published(reading))
        } else {
            tracing::warn!("publish refused, retrying next cycle");
            Ok(CycleStatus::Skipped(SkipReason::PublishRejected))
        }
    }

    /// Drive the loop until the shutdown flag is raised.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        self.begin()?;
        while !shutdown.load(Ordering::Relaxed) {
            self.step()?;
            self.clock.sleep(Duration::from_millis(LOOP_PAUSE_MS));
        }
        Ok(())
    }
}

/// Public dynamic (boxed) node assembled via the builder.
pub struct Node {
    inner: TankNode<Box<dyn Ranger>, Box<dyn NetworkLink>>,
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.inner.fmt(f)
    }
}

impl Node {
    /// Start building a Node.
    pub fn builder() -> NodeBuilder<Missing, Missing, Missing> {
        NodeBuilder::default()
    }

    pub fn last_reading(&self) -> Option<LevelReading> {
        self.inner.last_reading()
    }

    pub fn last_flow_lpm(&self) -> Option<f32> {
        self.inner.last_flow_lpm()
    }

    pub fn link_state(&self) -> LinkState {
        self.inner.link_state()
    }

    /// Startup connectivity; see [`TankNode::connect`].
    pub fn connect(&mut self) -> Result<()> {
        self.inner.connect()
    }

    /// Reset timers; call once before the first `step`.
    pub fn begin(&mut self) -> Result<()> {
        self.inner.begin()
    }

    /// One scheduler iteration.
    pub fn step(&mut self) -> Result<CycleStatus> {
        self.inner.step()
    }

    /// Drive the loop until the shutdown flag is raised.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        self.inner.run(shutdown)
    }
}

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

/// Builder for `Node`. Ranger, link and geometry advance the type-state;
/// everything else is optional and validated on `build()`.
pub struct NodeBuilder<R, L, G> {
    ranger: Option<Box<dyn Ranger>>,
    link: Option<Box<dyn NetworkLink>>,
    geometry: Option<TankGeometry>,
    pulse: Option<Box<dyn PulseCounter>>,
    sampling: Option<SamplerCfg>,
    flow_cfg: Option<FlowCfg>,
    link_cfg: Option<LinkCfg>,
    read_interval_ms: Option<u64>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    // Type-state markers
    _r: PhantomData<R>,
    _l: PhantomData<L>,
    _g: PhantomData<G>,
}

impl Default for NodeBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            ranger: None,
            link: None,
            geometry: None,
            pulse: None,
            sampling: None,
            flow_cfg: None,
            link_cfg: None,
            read_interval_ms: None,
            clock: None,
            _r: PhantomData,
            _l: PhantomData,
            _g: PhantomData,
        }
    }
}

impl<R, L, G> NodeBuilder<R, L, G> {
    /// Fallible build available in any type-state; returns a detailed
    /// BuildError for missing pieces.
    pub fn try_build(self) -> Result<Node> {
        let NodeBuilder {
            ranger,
            link,
            geometry,
            pulse,
            sampling,
            flow_cfg,
            link_cfg,
            read_interval_ms,
            clock,
            _r: _,
            _l: _,
            _g: _,
        } = self;

        let ranger = ranger.ok_or_else(|| eyre::Report::new(BuildError::MissingRanger))?;
        let link = link.ok_or_else(|| eyre::Report::new(BuildError::MissingLink))?;
        let geometry = geometry.ok_or_else(|| eyre::Report::new(BuildError::MissingGeometry))?;
        let link_cfg = link_cfg.ok_or_else(|| {
            eyre::Report::new(BuildError::InvalidConfig("link config not provided"))
        })?;

        let sampling = sampling.unwrap_or_default();
        let flow_cfg = flow_cfg.unwrap_or_default();
        let read_interval_ms = read_interval_ms.unwrap_or(30_000);
        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };

        // Validate configs (non-panicking; return typed build errors)
        if !geometry.height_cm.is_finite() || geometry.height_cm <= 0.0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "height_cm must be > 0",
            )));
        }
        if !geometry.capacity_liters.is_finite() || geometry.capacity_liters <= 0.0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "capacity_liters must be > 0",
            )));
        }
        if !geometry.sensor_offset_cm.is_finite() || geometry.sensor_offset_cm < 0.0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "sensor_offset_cm must be >= 0",
            )));
        }
        if !geometry.tolerance_cm.is_finite()
            || geometry.tolerance_cm < 0.0
            || geometry.tolerance_cm > geometry.sensor_offset_cm
        {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "tolerance_cm must be in [0, sensor_offset_cm]",
            )));
        }
        if sampling.samples == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "samples must be >= 1",
            )));
        }
        if read_interval_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "read_interval_ms must be >= 1",
            )));
        }
        if !flow_cfg.calibration_factor.is_finite() || flow_cfg.calibration_factor <= 0.0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "calibration_factor must be > 0",
            )));
        }
        if flow_cfg.window_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "window_ms must be >= 1",
            )));
        }
        if link_cfg.link_timeout_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "link_timeout_ms must be >= 1",
            )));
        }
        if link_cfg.client_id.is_empty() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "client_id must not be empty",
            )));
        }
        if link_cfg.topic.is_empty() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "topic must not be empty",
            )));
        }

        let epoch = clock.now();
        let sampler = DistanceSampler::new(ranger, sampling, clock.clone());
        let supervisor = LinkSupervisor::new(link, link_cfg, clock.clone());
        let flow = pulse.map(|p| FlowIntegrator::new(p, flow_cfg));

        Ok(Node {
            inner: TankNode {
                sampler,
                supervisor,
                flow,
                geometry,
                read_interval_ms,
                clock,
                epoch,
                last_read_ms: 0,
                last_reading: None,
            },
        })
    }
}

/// Chainable setters that do not affect type-state
impl<R, L, G> NodeBuilder<R, L, G> {
    /// Attach a flow pulse counter; without one, flow integration is off and
    /// the flow field never appears on the wire.
    pub fn with_pulse_counter(mut self, pulse: impl PulseCounter + 'static) -> Self {
        self.pulse = Some(Box::new(pulse));
        self
    }
    pub fn with_sampling(mut self, sampling: SamplerCfg) -> Self {
        self.sampling = Some(sampling);
        self
    }
    pub fn with_flow(mut self, flow_cfg: FlowCfg) -> Self {
        self.flow_cfg = Some(flow_cfg);
        self
    }
    pub fn with_link_cfg(mut self, link_cfg: LinkCfg) -> Self {
        self.link_cfg = Some(link_cfg);
        self
    }
    pub fn with_read_interval_ms(mut self, ms: u64) -> Self {
        self.read_interval_ms = Some(ms);
        self
    }
    /// Provide a custom clock implementation; defaults to MonotonicClock.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state when providing mandatory components
impl<L, G> NodeBuilder<Missing, L, G> {
    pub fn with_ranger(self, ranger: impl Ranger + 'static) -> NodeBuilder<Set, L, G> {
        let NodeBuilder {
            ranger: _,
            link,
            geometry,
            pulse,
            sampling,
            flow_cfg,
            link_cfg,
            read_interval_ms,
            clock,
            _r: _,
            _l: _,
            _g: _,
        } = self;
        NodeBuilder {
            ranger: Some(Box::new(ranger)),
            link,
            geometry,
            pulse,
            sampling,
            flow_cfg,
            link_cfg,
            read_interval_ms,
            clock,
            _r: PhantomData,
            _l: PhantomData,
            _g: PhantomData,
        }
    }
}

impl<R, G> NodeBuilder<R, Missing, G> {
    pub fn with_link(self, link: impl NetworkLink + 'static) -> NodeBuilder<R, Set, G> {
        let NodeBuilder {
            ranger,
            link: _,
            geometry,
            pulse,
            sampling,
            flow_cfg,
            link_cfg,
            read_interval_ms,
            clock,
            _r: _,
            _l: _,
            _g: _,
        } = self;
        NodeBuilder {
            ranger,
            link: Some(Box::new(link)),
            geometry,
            pulse,
            sampling,
            flow_cfg,
            link_cfg,
            read_interval_ms,
            clock,
            _r: PhantomData,
            _l: PhantomData,
            _g: PhantomData,
        }
    }
}

impl<R, L> NodeBuilder<R, L, Missing> {
    pub fn with_geometry(self, geometry: TankGeometry) -> NodeBuilder<R, L, Set> {
        let NodeBuilder {
            ranger,
            link,
            geometry: _,
            pulse,
            sampling,
            flow_cfg,
            link_cfg,
            read_interval_ms,
            clock,
            _r: _,
            _l: _,
            _g: _,
        } = self;
        NodeBuilder {
            ranger,
            link,
            geometry: Some(geometry),
            pulse,
            sampling,
            flow_cfg,
            link_cfg,
            read_interval_ms,
            clock,
            _r: PhantomData,
            _l: PhantomData,
            _g: PhantomData,
        }
    }
}

impl NodeBuilder<Set, Set, Set> {
    /// Validate and build the Node. Only available once ranger, link and
    /// geometry are set.
    pub fn build(self) -> Result<Node> {
        self.try_build()
    }
}
