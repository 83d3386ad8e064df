//! AJ-SR04M ultrasonic ranger on GPIO.
//!
//! One measurement: a 10 us trigger pulse, then the echo line's high phase
//! timed against a 30 ms deadline. Timeouts surface as the trait's zero
//! sentinel, not as errors.

use std::time::{Duration, Instant};
use tracing::trace;

use crate::error::{HwError, Result};
use tanklevel_traits::{BoxError, Ranger};

/// Echo deadline; ~500 cm one-way at the speed of sound.
const ECHO_TIMEOUT: Duration = Duration::from_micros(30_000);
const TRIGGER_SETTLE: Duration = Duration::from_micros(2);
const TRIGGER_PULSE: Duration = Duration::from_micros(10);

pub struct Sr04 {
    trigger: rppal::gpio::OutputPin,
    echo: rppal::gpio::InputPin,
}

impl Sr04 {
    pub fn new(trigger_pin: u8, echo_pin: u8) -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut trigger = gpio
            .get(trigger_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        let echo = gpio
            .get(echo_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input();
        trigger.set_low(); // idle low
        Ok(Self { trigger, echo })
    }

    fn fire_and_time(&mut self) -> Result<u32> {
        self.trigger.set_low();
        spin_wait(TRIGGER_SETTLE);
        self.trigger.set_high();
        spin_wait(TRIGGER_PULSE);
        self.trigger.set_low();

        // Wait for the echo line to rise
        let deadline = Instant::now() + ECHO_TIMEOUT;
        while self.echo.is_low() {
            if Instant::now() >= deadline {
                return Err(HwError::EchoTimeout);
            }
            std::hint::spin_loop();
        }

        // Time the high phase
        let rise = Instant::now();
        while self.echo.is_high() {
            if Instant::now() >= deadline {
                return Err(HwError::EchoTimeout);
            }
            std::hint::spin_loop();
        }
        let echo_us = rise.elapsed().as_micros().min(u128::from(u32::MAX)) as u32;
        trace!(echo_us, "sr04 raw echo");
        Ok(echo_us)
    }
}

impl Ranger for Sr04 {
    fn trigger_and_measure(&mut self) -> std::result::Result<u32, BoxError> {
        match self.fire_and_time() {
            Ok(echo_us) => Ok(echo_us),
            // Timeout is the zero sentinel at the capability seam.
            Err(HwError::EchoTimeout) => Ok(0),
            Err(e) => Err(Box::new(e)),
        }
    }
}

#[inline]
fn spin_wait(d: Duration) {
    let end = Instant::now() + d;
    while Instant::now() < end {
        std::hint::spin_loop();
    }
}
