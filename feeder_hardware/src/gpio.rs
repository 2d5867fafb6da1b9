//! Raspberry Pi GPIO button pad (active-low, internal pull-ups).

use tracing::{trace, warn};

use crate::error::{HwError, Result};
use feeder_traits::{ButtonId, ButtonPad};

pub struct GpioPad {
    pins: [Option<rppal::gpio::InputPin>; ButtonId::ALL.len()],
}

impl GpioPad {
    /// Claim the five button lines. A line that fails to export is logged
    /// and treated as permanently unreadable rather than failing the pad;
    /// the GPIO chip itself being unavailable is fatal.
    pub fn new(bcm: [u8; ButtonId::ALL.len()]) -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut pins: [Option<rppal::gpio::InputPin>; ButtonId::ALL.len()] = Default::default();
        for id in ButtonId::ALL {
            match gpio.get(bcm[id.index()]) {
                Ok(pin) => pins[id.index()] = Some(pin.into_input_pullup()),
                Err(e) => {
                    warn!(button = %id, pin = bcm[id.index()], error = %e, "button line unavailable");
                }
            }
        }
        Ok(Self { pins })
    }
}

impl ButtonPad for GpioPad {
    fn read(&mut self, id: ButtonId) -> Option<bool> {
        let pin = self.pins[id.index()].as_ref()?;
        let pressed = pin.is_low();
        trace!(button = %id, pressed, "gpio read");
        Some(pressed)
    }
}
