//! Node assembly and command execution: backend selection, startup
//! connectivity with the restart policy, and the telemetry loop.

use eyre::{Result, WrapErr, eyre};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tanklevel_config::Config;
use tanklevel_core::{
    CycleStatus, DistanceSampler, FlowCfg, LevelReading, LinkCfg, Node, SamplerCfg, TankGeometry,
    TelemetryPayload, compute_level,
};
use tanklevel_traits::{Clock, MonotonicClock, NetworkLink, PulseCounter, Ranger};

/// Pause between loop iterations (ms); keeps ctrl-c handling responsive
/// without spinning.
const LOOP_PAUSE_MS: u64 = 10;

#[cfg(feature = "hardware")]
fn build_ranger(cfg: &Config) -> Result<Box<dyn Ranger>> {
    let sr04 = tanklevel_hardware::sr04::Sr04::new(cfg.pins.trigger, cfg.pins.echo)
        .wrap_err("init ultrasonic ranger")?;
    Ok(Box::new(sr04))
}

#[cfg(not(feature = "hardware"))]
fn build_ranger(cfg: &Config) -> Result<Box<dyn Ranger>> {
    // Simulated tank reads half full.
    let distance_cm = cfg.tank.sensor_offset_cm + cfg.tank.height_cm * 0.5;
    Ok(Box::new(tanklevel_hardware::SimulatedRanger::new(
        distance_cm,
    )))
}

fn build_pulse(cfg: &Config) -> Result<Option<Box<dyn PulseCounter>>> {
    let Some(pin) = cfg.pins.flow_pulse else {
        return Ok(None);
    };
    #[cfg(feature = "hardware")]
    {
        let counter = tanklevel_hardware::yfs201::Yfs201::new(pin).wrap_err("init flow sensor")?;
        Ok(Some(Box::new(counter)))
    }
    #[cfg(not(feature = "hardware"))]
    {
        let _ = pin;
        Ok(Some(Box::new(tanklevel_hardware::SimulatedPulseCounter::new())))
    }
}

// The transport itself is an external collaborator; this binary wires the
// simulated one. A deployment embeds the core crates behind its own
// NetworkLink implementation.
fn build_link() -> Box<dyn NetworkLink> {
    Box::new(tanklevel_hardware::SimulatedLink::new())
}

fn build_node(cfg: &Config, read_interval_ms: Option<u64>) -> Result<Node> {
    let builder = Node::builder()
        .with_ranger(build_ranger(cfg)?)
        .with_link(build_link())
        .with_geometry(TankGeometry::from(&cfg.tank))
        .with_link_cfg(LinkCfg::from(cfg))
        .with_sampling(SamplerCfg::from(&cfg.sampling))
        .with_flow(FlowCfg::from(&cfg.flow))
        .with_read_interval_ms(read_interval_ms.unwrap_or(cfg.sampling.read_interval_ms));
    let builder = match build_pulse(cfg)? {
        Some(pulse) => builder.with_pulse_counter(pulse),
        None => builder,
    };
    builder.build().wrap_err("assemble node")
}

pub fn run(cfg: &Config, read_interval_ms: Option<u64>, cycles: Option<u32>) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .wrap_err("install signal handler")?;
    }

    let mut node = build_node(cfg, read_interval_ms)?;

    // Startup link failure is unrecoverable in place: cool down, then exit
    // nonzero so the process supervisor restarts the node with fresh radio
    // state.
    if let Err(e) = node.connect() {
        tracing::error!(
            error = %e,
            cooldown_ms = cfg.link.restart_cooldown_ms,
            "startup connectivity failed, restarting after cooldown"
        );
        MonotonicClock::new().sleep(Duration::from_millis(cfg.link.restart_cooldown_ms));
        return Err(e).wrap_err("startup connectivity");
    }

    tracing::info!(
        interval_ms = read_interval_ms.unwrap_or(cfg.sampling.read_interval_ms),
        topic = %cfg.broker.topic,
        "telemetry loop started"
    );
    node.begin()?;

    let clock = MonotonicClock::new();
    let mut published: u32 = 0;
    while !shutdown.load(Ordering::Relaxed) {
        match node.step()? {
            CycleStatus::Published(reading) => {
                print_reading(&reading, node.last_flow_lpm())?;
                published += 1;
                if let Some(n) = cycles
                    && published >= n
                {
                    break;
                }
            }
            CycleStatus::Idle | CycleStatus::Skipped(_) => {}
        }
        clock.sleep(Duration::from_millis(LOOP_PAUSE_MS));
    }

    tracing::info!(published, "telemetry loop stopped");
    Ok(())
}

pub fn read_once(cfg: &Config) -> Result<()> {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let mut sampler = DistanceSampler::new(
        build_ranger(cfg)?,
        SamplerCfg::from(&cfg.sampling),
        clock,
    );
    let Some(distance_cm) = sampler.sample()? else {
        return Err(eyre!("no valid echo from the ranger"));
    };
    let reading = compute_level(distance_cm, &TankGeometry::from(&cfg.tank));
    print_reading(&reading, None)
}

pub fn self_check(cfg: &Config) -> Result<()> {
    let mut ranger = build_ranger(cfg)?;
    let echo_us = ranger
        .trigger_and_measure()
        .map_err(|e| eyre!("ranging self-check failed: {e}"))?;
    println!("ranger ok (echo {echo_us} us)");

    if cfg.pins.flow_pulse.is_some() {
        let mut pulse =
            build_pulse(cfg)?.ok_or_else(|| eyre!("flow pin configured but no counter built"))?;
        pulse
            .read_and_reset()
            .map_err(|e| eyre!("pulse counter self-check failed: {e}"))?;
        println!("flow counter ok");
    }
    Ok(())
}

fn print_reading(reading: &LevelReading, flow_lpm: Option<f32>) -> Result<()> {
    let payload = TelemetryPayload::from_reading(reading, flow_lpm, None);
    println!(
        "{}",
        serde_json::to_string(&payload).wrap_err("render payload")?
    );
    Ok(())
}
