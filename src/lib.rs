/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
/*!
A platform agnostic Rust driver for the three-output [Si5351A], based on the
[`embedded-hal`] traits, that synthesizes arbitrary output frequencies and
reprograms only what changed.

## The Device

The Silicon Labs [Si5351A] is an any-frequency CMOS clock generator with two
PLLs (A and B) and three outputs. The frequency plan used by this driver is
fixed:

* `CLK0` runs from PLL A with an integer multisynth;
* `CLK1` runs from PLL B with an integer multisynth;
* `CLK2` runs from PLL B, fractionally against the VCO tuned for `CLK1`, or
  with its own integer multisynth when `CLK1` is off;
* in quadrature mode `CLK0` and `CLK1` share PLL A and a single divider, 90°
  apart.

Small frequency changes only retune the PLL feedback divider. The output
multisynth is rewritten, and the PLL reset, only when the integer divider has
to move. Resets requested while processing one call are issued as a single
register write at the end of that call.

## Usage

Wrap the I²C peripheral of your `embedded_hal` implementation in a
[`HalI2c`] (or bit-bang the bus with [`SoftI2c`]) and instantiate the device:

```ignore
use si5351_synth::{ClockOutput, DriveStrength, HalI2c, Si5351, Si5351Device};

let mut clock = Si5351Device::new_adafruit_module(HalI2c::new(i2c));
clock.setup(DriveStrength::_8, DriveStrength::_8, DriveStrength::_8)?;

let reset = clock.set_frequencies(14_175_000, 10_000_000, 7_000_000)?;
assert!(clock.is_locked(ClockOutput::Clk2));
```

A zero frequency turns the output off. A frequency the chip cannot produce
turns the output off too, which [`Si5351::is_locked`] reports.

[Si5351A]: https://www.silabs.com/documents/public/data-sheets/Si5351-B.pdf
[`embedded-hal`]: https://github.com/japaric/embedded-hal
*/
//#![deny(missing_docs)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate bitflags;

mod device;
pub mod registers;
pub mod soft_i2c;
pub mod solver;
mod synth;
pub mod transport;

#[cfg(test)]
mod mock;

use core::fmt;

pub use crate::device::{Si5351, Si5351Device};
pub use crate::registers::{DeviceStatusBits, PLLResetBits};
pub use crate::soft_i2c::SoftI2c;
pub use crate::solver::{SynthesizerConfig, VcoRange};
pub use crate::synth::{ChannelState, MultisynthMode};
pub use crate::transport::{HalI2c, Transport};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    CommunicationError,
    InvalidParameter,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::CommunicationError => write!(f, "Communication Error"),
            Error::InvalidParameter => write!(f, "Invalid Parameter"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CrystalLoad {
    _6,
    _8,
    _10,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PLL {
    A,
    B,
}

/// The three outputs of the Si5351A.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockOutput {
    Clk0 = 0,
    Clk1,
    Clk2,
}

/// Power-of-two R divider placed after an output multisynth.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputDivider {
    Div1 = 0,
    Div2,
    Div4,
    Div8,
    Div16,
    Div32,
    Div64,
    Div128,
}

/// Output drive strength, in milliamperes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriveStrength {
    _2 = 0,
    _4,
    _6,
    _8,
}

impl Default for OutputDivider {
    fn default() -> Self {
        OutputDivider::Div1
    }
}

impl Default for DriveStrength {
    fn default() -> Self {
        DriveStrength::_8
    }
}

const ADDRESS: u8 = 0b0110_0000;

impl PLL {
    pub fn multisynth(&self) -> registers::FeedbackMultisynth {
        match *self {
            PLL::A => registers::FeedbackMultisynth::MSNA,
            PLL::B => registers::FeedbackMultisynth::MSNB,
        }
    }

    pub fn reset_bit(&self) -> PLLResetBits {
        match *self {
            PLL::A => PLLResetBits::PLLA_RST,
            PLL::B => PLLResetBits::PLLB_RST,
        }
    }
}

impl ClockOutput {
    pub const ALL: [ClockOutput; 3] = [ClockOutput::Clk0, ClockOutput::Clk1, ClockOutput::Clk2];

    /// PLL feeding the output outside of quadrature mode.
    pub fn pll(self) -> PLL {
        match self {
            ClockOutput::Clk0 => PLL::A,
            ClockOutput::Clk1 | ClockOutput::Clk2 => PLL::B,
        }
    }

    pub fn multisynth(self) -> registers::Multisynth {
        match self {
            ClockOutput::Clk0 => registers::Multisynth::MS0,
            ClockOutput::Clk1 => registers::Multisynth::MS1,
            ClockOutput::Clk2 => registers::Multisynth::MS2,
        }
    }
}

impl OutputDivider {
    /// Divider for a shift of `shift` binary places, if the 3-bit field can hold it.
    pub fn from_shift(shift: u8) -> Option<OutputDivider> {
        match shift {
            0 => Some(OutputDivider::Div1),
            1 => Some(OutputDivider::Div2),
            2 => Some(OutputDivider::Div4),
            3 => Some(OutputDivider::Div8),
            4 => Some(OutputDivider::Div16),
            5 => Some(OutputDivider::Div32),
            6 => Some(OutputDivider::Div64),
            7 => Some(OutputDivider::Div128),
            _ => None,
        }
    }

    pub fn shift(&self) -> u8 {
        *self as u8
    }

    /// R_DIV field, already in position for the third byte of a parameter block.
    fn bits(&self) -> u8 {
        (*self as u8) << 4
    }

    pub fn denominator(&self) -> u32 {
        1 << self.shift()
    }
}
