/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Register map and parameter block encoding.

use crate::{ClockOutput, CrystalLoad, DriveStrength, Error, OutputDivider, PLL};

/// Largest value of the 20-bit numerator and denominator fields.
pub const FRAC_DENOM: u32 = 0xF_FFFF;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FeedbackMultisynth {
    MSNA,
    MSNB,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Multisynth {
    MS0,
    MS1,
    MS2,
}

/// An 8-byte `P1`/`P2`/`P3` parameter block.
pub trait ParameterBlock {
    fn base_addr(&self) -> u8;
}

impl ParameterBlock for FeedbackMultisynth {
    fn base_addr(&self) -> u8 {
        match *self {
            FeedbackMultisynth::MSNA => 26,
            FeedbackMultisynth::MSNB => 34,
        }
    }
}

impl ParameterBlock for Multisynth {
    fn base_addr(&self) -> u8 {
        match *self {
            Multisynth::MS0 => 42,
            Multisynth::MS1 => 50,
            Multisynth::MS2 => 58,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Register {
    DeviceStatus = 0,
    Clk0 = 16,
    Clk1 = 17,
    Clk2 = 18,
    DisableState = 24,
    Clk0PhaseOffset = 165,
    Clk1PhaseOffset = 166,
    PLLReset = 177,
    CrystalLoad = 183,
    FanoutEnable = 187,
}

impl Register {
    pub fn addr(&self) -> u8 {
        *self as u8
    }
}

impl ClockOutput {
    pub fn register(self) -> Register {
        match self {
            ClockOutput::Clk0 => Register::Clk0,
            ClockOutput::Clk1 => Register::Clk1,
            ClockOutput::Clk2 => Register::Clk2,
        }
    }

    /// Only `CLK0` and `CLK1` take part in quadrature, so only they get a phase register here.
    pub fn phase_register(self) -> Option<Register> {
        match self {
            ClockOutput::Clk0 => Some(Register::Clk0PhaseOffset),
            ClockOutput::Clk1 => Some(Register::Clk1PhaseOffset),
            ClockOutput::Clk2 => None,
        }
    }
}

bitflags! {
    pub struct DeviceStatusBits: u8 {
        const SYS_INIT = 0b1000_0000;
        const LOL_B = 0b0100_0000;
        const LOL_A = 0b0010_0000;
        const LOS = 0b0001_0000;
    }
}

bitflags! {
    pub(crate) struct CrystalLoadBits: u8 {
        const RESERVED = 0b00_010010;
        const CL_MASK = 0b11_000000;
        const CL_6 = 0b01_000000;
        const CL_8 = 0b10_000000;
        const CL_10 = 0b11_000000;
    }
}

bitflags! {
    pub(crate) struct ClockControlBits: u8 {
        const CLK_PDN = 0b1000_0000;
        const MS_INT = 0b0100_0000;
        const MS_SRC = 0b0010_0000;
        const CLK_INV = 0b0001_0000;
        const CLK_SRC_MASK = 0b0000_1100;
        const CLK_SRC_XTAL = 0b0000_0000;
        const CLK_SRC_CLKIN = 0b0000_0100;
        const CLK_SRC_MS_ALT = 0b0000_1000;
        const CLK_SRC_MS = 0b0000_1100;
        const CLK_DRV_MASK = 0b0000_0011;
        const CLK_DRV_2 = 0b0000_0000;
        const CLK_DRV_4 = 0b0000_0001;
        const CLK_DRV_6 = 0b0000_0010;
        const CLK_DRV_8 = 0b0000_0011;
    }
}

bitflags! {
    /// PLL reset requests; also what the frequency-setting calls report back.
    pub struct PLLResetBits: u8 {
        const PLLB_RST = 0b1000_0000;
        const PLLA_RST = 0b0010_0000;
    }
}

bitflags! {
    pub(crate) struct FanoutBits: u8 {
        const CLKIN_FANOUT_EN = 0b1000_0000;
        const XO_FANOUT_EN = 0b0100_0000;
        const MS_FANOUT_EN = 0b0001_0000;
    }
}

/// `MSx_DIVBY4` bits in the third byte of an output parameter block.
const DIVBY4: u8 = 0b0000_1100;

impl CrystalLoad {
    pub(crate) fn bits(self) -> u8 {
        (CrystalLoadBits::RESERVED
            | match self {
                CrystalLoad::_6 => CrystalLoadBits::CL_6,
                CrystalLoad::_8 => CrystalLoadBits::CL_8,
                CrystalLoad::_10 => CrystalLoadBits::CL_10,
            })
        .bits()
    }
}

impl DriveStrength {
    pub(crate) fn control_bits(self) -> ClockControlBits {
        match self {
            DriveStrength::_2 => ClockControlBits::CLK_DRV_2,
            DriveStrength::_4 => ClockControlBits::CLK_DRV_4,
            DriveStrength::_6 => ClockControlBits::CLK_DRV_6,
            DriveStrength::_8 => ClockControlBits::CLK_DRV_8,
        }
    }
}

/// Control byte for an output driven by a multisynth fed from `pll`.
pub(crate) fn clock_control(drive: DriveStrength, pll: PLL, integer: bool) -> u8 {
    let ms_int = if integer {
        ClockControlBits::MS_INT
    } else {
        ClockControlBits::empty()
    };
    let ms_src = match pll {
        PLL::A => ClockControlBits::empty(),
        PLL::B => ClockControlBits::MS_SRC,
    };
    (ClockControlBits::CLK_SRC_MS | ms_int | ms_src | drive.control_bits()).bits()
}

/// A divide ratio `a + b / c`, as programmed into a feedback or output multisynth.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MultisynthParams {
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

/// The `P1`, `P2` and `P3` register fields of a parameter block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PackedParams {
    pub p1: u32,
    pub p2: u32,
    pub p3: u32,
}

impl MultisynthParams {
    /// Integer ratio; `P2 = 0, P3 = 1` makes the chip treat the divider as an integer.
    pub fn integer(divider: u32) -> Self {
        MultisynthParams {
            a: divider,
            b: 0,
            c: 1,
        }
    }

    /// Feedback ratio that brings the crystal up to `vco_freq`.
    ///
    /// The fraction is kept in units of 32 Hz so the denominator fits the
    /// 20-bit field for any crystal up to 33.5 MHz.
    pub fn feedback(vco_freq: u32, xtal_freq: u32) -> Self {
        MultisynthParams {
            a: vco_freq / xtal_freq,
            b: (vco_freq % xtal_freq) >> 5,
            c: xtal_freq >> 5,
        }
    }

    pub fn pack(&self) -> Result<PackedParams, Error> {
        if self.c == 0 || self.b > FRAC_DENOM || self.c > FRAC_DENOM {
            return Err(Error::InvalidParameter);
        }

        let (a, b, c) = (self.a as u64, self.b as u64, self.c as u64);
        let t = 128 * b / c;
        let p1 = (128 * a + t)
            .checked_sub(512)
            .filter(|p1| *p1 <= 0x3_FFFF)
            .ok_or(Error::InvalidParameter)?;

        Ok(PackedParams {
            p1: p1 as u32,
            p2: (128 * b - c * t) as u32,
            p3: self.c,
        })
    }
}

impl PackedParams {
    /// Inverse of [`MultisynthParams::pack`] for proper fractions (`b < c`).
    #[cfg(test)]
    pub(crate) fn unpack(&self) -> MultisynthParams {
        let (p1, p2, c) = (self.p1 as u64 + 512, self.p2 as u64, self.p3 as u64);
        let t = p1 % 128;
        MultisynthParams {
            a: (p1 / 128) as u32,
            b: ((p2 + c * t) / 128) as u32,
            c: self.p3,
        }
    }

    /// Register image of the block, starting at its base address.
    pub fn to_block(&self, r_div: OutputDivider, divby4: bool) -> [u8; 8] {
        let (p1, p2, p3) = (self.p1, self.p2, self.p3);
        [
            (p3 >> 8) as u8,
            p3 as u8,
            ((p1 >> 16) & 0x03) as u8 | r_div.bits() | if divby4 { DIVBY4 } else { 0 },
            (p1 >> 8) as u8,
            p1 as u8,
            (((p3 & 0x000F_0000) >> 12) | ((p2 & 0x000F_0000) >> 16)) as u8,
            (p2 >> 8) as u8,
            p2 as u8,
        ]
    }
}
