//! Pump and mister relays. The `gpio` feature gates the real rppal driver;
//! without it, a mock board tracks state in memory and logs changes.

use anyhow::Result;
use std::fmt;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    Pump,
    Mister,
}

impl fmt::Display for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relay::Pump => f.write_str("pump"),
            Relay::Mister => f.write_str("mister"),
        }
    }
}

// ---------------------------------------------------------------------------
// Real GPIO relay board (production: requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub struct RelayBoard {
    pump: OutputPin,
    mister: OutputPin,
    active_low: bool, // many relay boards are active-low
}

#[cfg(feature = "gpio")]
impl RelayBoard {
    pub fn new(pump_gpio: u8, mister_gpio: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new()?;
        let pump = gpio.get(pump_gpio)?.into_output();
        let mister = gpio.get(mister_gpio)?.into_output();

        let mut board = Self {
            pump,
            mister,
            active_low,
        };
        // Fail-safe: ensure "OFF" at startup
        board.all_off();

        tracing::info!(pump_gpio, mister_gpio, active_low, "relay board initialised");
        Ok(board)
    }

    fn pin(&mut self, relay: Relay) -> &mut OutputPin {
        match relay {
            Relay::Pump => &mut self.pump,
            Relay::Mister => &mut self.mister,
        }
    }

    pub fn set(&mut self, relay: Relay, on: bool) {
        // active-low: LOW = ON, HIGH = OFF
        let high = on != self.active_low;
        let pin = self.pin(relay);
        if high {
            pin.set_high();
        } else {
            pin.set_low();
        }
        tracing::debug!(%relay, on, "relay set");
    }

    pub fn is_on(&self, relay: Relay) -> bool {
        let pin = match relay {
            Relay::Pump => &self.pump,
            Relay::Mister => &self.mister,
        };
        pin.is_set_high() != self.active_low
    }

    pub fn all_off(&mut self) {
        self.set(Relay::Pump, false);
        self.set(Relay::Mister, false);
    }
}

// ---------------------------------------------------------------------------
// Mock relay board (development: no hardware, logs state)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub struct RelayBoard {
    pub(crate) pump: bool,
    pub(crate) mister: bool,
    /// Number of actual on/off edges, for chatter assertions.
    pub(crate) switches: u32,
}

#[cfg(not(feature = "gpio"))]
impl RelayBoard {
    pub fn new(pump_gpio: u8, mister_gpio: u8, _active_low: bool) -> Result<Self> {
        tracing::info!(
            pump_gpio,
            mister_gpio,
            "[mock-gpio] relay board initialised (no hardware)"
        );
        Ok(Self {
            pump: false,
            mister: false,
            switches: 0,
        })
    }

    pub fn set(&mut self, relay: Relay, on: bool) {
        let state = match relay {
            Relay::Pump => &mut self.pump,
            Relay::Mister => &mut self.mister,
        };
        if *state != on {
            self.switches += 1;
        }
        *state = on;
        tracing::debug!(%relay, on, "[mock-gpio] relay set");
    }

    pub fn is_on(&self, relay: Relay) -> bool {
        match relay {
            Relay::Pump => self.pump,
            Relay::Mister => self.mister,
        }
    }

    pub fn all_off(&mut self) {
        self.set(Relay::Pump, false);
        self.set(Relay::Mister, false);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
