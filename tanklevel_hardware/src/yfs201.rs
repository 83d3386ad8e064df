//! YF-S201 hall-effect flow sensor.
//!
//! Rising edges are counted on the GPIO interrupt thread into an atomic;
//! `read_and_reset` drains it with a single swap, which is the whole
//! critical section against the interrupt source.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{HwError, Result};
use tanklevel_traits::{BoxError, PulseCounter};

pub struct Yfs201 {
    // Held to keep the async interrupt registered.
    _pin: rppal::gpio::InputPin,
    count: Arc<AtomicU32>,
}

impl Yfs201 {
    pub fn new(pulse_pin: u8) -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut pin = gpio
            .get(pulse_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input_pullup();

        let count = Arc::new(AtomicU32::new(0));
        let isr_count = count.clone();
        pin.set_async_interrupt(rppal::gpio::Trigger::RisingEdge, move |_| {
            isr_count.fetch_add(1, Ordering::AcqRel);
        })
        .map_err(|e| HwError::Gpio(e.to_string()))?;

        Ok(Self { _pin: pin, count })
    }
}

impl PulseCounter for Yfs201 {
    fn read_and_reset(&mut self) -> std::result::Result<u32, BoxError> {
        Ok(self.count.swap(0, Ordering::AcqRel))
    }
}
