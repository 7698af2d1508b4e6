/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Divider selection.
//!
//! Every solver returns `None` when the requested frequency cannot be
//! produced within the chip's limits; the caller then turns the output off.

use crate::registers::FRAC_DENOM;
use crate::{Error, OutputDivider};

/// Largest integer multisynth divider tried before pushing division into the R divider.
pub const MS_INT_DIVIDER_MAX: u32 = 300;
/// Hardware ceiling of an output multisynth divider.
pub const MS_DIVIDER_MAX: u32 = 1800;
/// Below 6 the only valid multisynth divider is 4.
pub const MS_DIVIDER_MIN: u32 = 6;
/// Smallest divider the fractional path accepts.
pub const MS_FRAC_DIVIDER_MIN: u32 = 8;
/// Largest integer part the fractional path keeps before shifting into the R divider.
pub const MS_FRAC_DIVIDER_MAX: u32 = 64;
/// The phase offset register is 7 bits wide, which caps the quadrature divider.
pub const QUADRATURE_DIVIDER_MAX: u32 = 0x7F;

const MAX_R_SHIFT: u8 = 7;

/// Valid operating range of the VCO, in Hz.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VcoRange {
    min: u32,
    max: u32,
    mid: u32,
}

impl VcoRange {
    pub fn new(min: u32, max: u32) -> Result<Self, Error> {
        if min == 0 || min >= max {
            return Err(Error::InvalidParameter);
        }
        Ok(VcoRange {
            min,
            max,
            mid: ((min as u64 + max as u64) / 2) as u32,
        })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn mid(&self) -> u32 {
        self.mid
    }

    pub fn contains(&self, freq: u64) -> bool {
        self.min as u64 <= freq && freq <= self.max as u64
    }
}

impl Default for VcoRange {
    fn default() -> Self {
        VcoRange {
            min: 600_000_000,
            max: 900_000_000,
            mid: 750_000_000,
        }
    }
}

/// Reference crystal and VCO bounds shared by both PLLs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SynthesizerConfig {
    xtal_freq: u32,
    vco: VcoRange,
}

impl SynthesizerConfig {
    pub fn new(xtal_freq: u32) -> Result<Self, Error> {
        Self::with_vco_range(xtal_freq, VcoRange::default())
    }

    pub fn with_vco_range(xtal_freq: u32, vco: VcoRange) -> Result<Self, Error> {
        check_xtal_freq(xtal_freq)?;
        Ok(SynthesizerConfig { xtal_freq, vco })
    }

    pub fn xtal_freq(&self) -> u32 {
        self.xtal_freq
    }

    pub fn vco(&self) -> &VcoRange {
        &self.vco
    }

    pub(crate) fn set_xtal_freq(&mut self, xtal_freq: u32) -> Result<(), Error> {
        check_xtal_freq(xtal_freq)?;
        self.xtal_freq = xtal_freq;
        Ok(())
    }

    pub(crate) fn set_vco(&mut self, vco: VcoRange) {
        self.vco = vco;
    }
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        SynthesizerConfig {
            xtal_freq: 25_000_000,
            vco: VcoRange::default(),
        }
    }
}

/// The feedback denominator is `xtal >> 5` and has to fit 20 bits.
fn check_xtal_freq(xtal_freq: u32) -> Result<(), Error> {
    match xtal_freq >> 5 {
        1..=FRAC_DENOM => Ok(()),
        _ => Err(Error::InvalidParameter),
    }
}

/// Integer multisynth divider followed by the R divider.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IntegerDivider {
    pub divider: u16,
    pub r_div: OutputDivider,
}

impl IntegerDivider {
    /// VCO frequency this divider needs to produce `freq`.
    pub fn vco_freq(&self, freq: u32) -> u64 {
        self.divider as u64 * freq as u64 * self.r_div.denominator() as u64
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IntegerSolution {
    pub divider: IntegerDivider,
    pub vco_freq: u32,
}

/// Output multisynth ratio `integer + numerator / denominator`, then the R divider.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FractionalSolution {
    pub integer: u32,
    pub numerator: u32,
    pub denominator: u32,
    pub r_div: OutputDivider,
}

impl FractionalSolution {
    pub fn is_integer(&self) -> bool {
        self.numerator == 0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QuadratureSolution {
    pub divider: u16,
    /// Quarter period of the output in units of the VCO period, for the phase register.
    pub phase: u8,
    pub vco_freq: u32,
}

/// Picks an integer divider and R divider that put the VCO inside `vco`.
///
/// `previous` is kept as is whenever it still puts the VCO in range: the PLL
/// can then be retuned without touching the output multisynth, and without a
/// reset.
pub fn solve_integer(freq: u32, previous: IntegerDivider, vco: &VcoRange) -> Option<IntegerSolution> {
    if freq == 0 {
        return None;
    }

    let reused = previous.vco_freq(freq);
    if previous.divider != 0 && vco.contains(reused) {
        return Some(IntegerSolution {
            divider: previous,
            vco_freq: reused as u32,
        });
    }

    let mut divider = vco.mid() / freq;
    if divider < 4 {
        return None;
    }
    if divider < MS_DIVIDER_MIN {
        divider = 4;
    }

    let mut shift = 0;
    while divider > MS_INT_DIVIDER_MAX && shift < MAX_R_SHIFT {
        shift += 1;
        divider >>= 1;
    }
    if shift == 0 {
        // integer multisynth division has to be even, except divide-by-4
        divider &= !1;
        if (divider as u64) * (freq as u64) < vco.min() as u64 {
            divider += 2;
        }
    }
    if divider > MS_DIVIDER_MAX {
        return None;
    }

    let solution = IntegerDivider {
        divider: divider as u16,
        r_div: OutputDivider::from_shift(shift)?,
    };
    let vco_freq = solution.vco_freq(freq);
    if !vco.contains(vco_freq) {
        return None;
    }

    Some(IntegerSolution {
        divider: solution,
        vco_freq: vco_freq as u32,
    })
}

/// Divides an already tuned VCO down to `freq` with a fractional multisynth.
pub fn solve_fractional(vco_freq: u32, freq: u32) -> Option<FractionalSolution> {
    if freq == 0 {
        return None;
    }

    let mut divider = vco_freq / freq;
    if divider < MS_FRAC_DIVIDER_MIN {
        return None;
    }

    let mut shift = 0;
    let mut scaled = freq;
    while divider > MS_FRAC_DIVIDER_MAX {
        shift += 1;
        scaled <<= 1;
        divider >>= 1;
    }
    let r_div = OutputDivider::from_shift(shift)?;

    let numerator =
        ((vco_freq % scaled) as u64 * FRAC_DENOM as u64 / scaled as u64) as u32;

    Some(FractionalSolution {
        integer: vco_freq / scaled,
        numerator,
        denominator: if numerator != 0 { FRAC_DENOM } else { 1 },
        r_div,
    })
}

/// Picks the divider shared by the two outputs of a quadrature pair.
///
/// Between 2 and 4 MHz the VCO runs below its nominal minimum. The chip
/// usually locks there but this is outside the datasheet.
pub fn solve_quadrature(freq: u32, vco: &VcoRange) -> Option<QuadratureSolution> {
    let mut divider = if freq >= 7_000_000 {
        vco.max() / freq
    } else if freq >= 4_000_000 {
        vco.min() / freq
    } else if freq >= 2_000_000 {
        QUADRATURE_DIVIDER_MAX
    } else {
        return None;
    };

    if divider < 4 {
        return None;
    }
    divider = divider.min(QUADRATURE_DIVIDER_MAX);
    if divider < MS_DIVIDER_MIN {
        divider = 4;
    }

    Some(QuadratureSolution {
        divider: divider as u16,
        phase: divider as u8,
        vco_freq: divider * freq,
    })
}
