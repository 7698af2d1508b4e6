/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Per-output bookkeeping and the incremental frequency plan.

use crate::device::Si5351Device;
use crate::registers::{
    clock_control, ClockControlBits, MultisynthParams, PLLResetBits, PackedParams, Register,
};
use crate::solver::{self, IntegerDivider};
use crate::transport::Transport;
use crate::{ClockOutput, DriveStrength, Error, OutputDivider, PLL};

/// How an output multisynth was last programmed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MultisynthMode {
    Off,
    Integer,
    /// Fractional divider against the VCO tuned for another output.
    Fractional,
}

/// What the driver knows about one output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelState {
    freq: u32,
    stale: bool,
    divider: u16,
    r_div: OutputDivider,
    mode: MultisynthMode,
    drive: DriveStrength,
}

impl ChannelState {
    pub(crate) const fn new(drive: DriveStrength) -> Self {
        ChannelState {
            freq: 0,
            stale: true,
            divider: 0,
            r_div: OutputDivider::Div1,
            mode: MultisynthMode::Off,
            drive,
        }
    }

    /// Last requested frequency in Hz, 0 when the output was turned off.
    pub fn freq(&self) -> u32 {
        self.freq
    }

    pub fn divider(&self) -> u16 {
        self.divider
    }

    pub fn r_div(&self) -> OutputDivider {
        self.r_div
    }

    pub fn mode(&self) -> MultisynthMode {
        self.mode
    }

    pub fn drive(&self) -> DriveStrength {
        self.drive
    }

    /// The output holds a programmed divider. This is not the PLL lock detector.
    pub fn is_locked(&self) -> bool {
        self.mode != MultisynthMode::Off
    }

    fn changed(&self, freq: u32) -> bool {
        self.stale || self.freq != freq
    }

    fn request(&mut self, freq: u32) {
        self.freq = freq;
        self.stale = false;
    }

    fn last_integer(&self) -> IntegerDivider {
        match self.mode {
            MultisynthMode::Integer => IntegerDivider {
                divider: self.divider,
                r_div: self.r_div,
            },
            _ => IntegerDivider::default(),
        }
    }

    fn set_integer(&mut self, divider: IntegerDivider) {
        self.divider = divider.divider;
        self.r_div = divider.r_div;
        self.mode = MultisynthMode::Integer;
    }

    fn set_fractional(&mut self, integer: u16, r_div: OutputDivider) {
        self.divider = integer;
        self.r_div = r_div;
        self.mode = MultisynthMode::Fractional;
    }

    fn clear_divider(&mut self) {
        self.divider = 0;
        self.r_div = OutputDivider::Div1;
        self.mode = MultisynthMode::Off;
    }

    /// Forces a full reprogram on the next frequency update.
    pub(crate) fn invalidate(&mut self) {
        self.clear_divider();
        self.stale = true;
    }

    pub(crate) fn set_drive(&mut self, drive: DriveStrength) {
        self.drive = drive;
    }

    pub(crate) fn set_off(&mut self) {
        self.request(0);
        self.clear_divider();
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Channels {
    clk0: ChannelState,
    clk1: ChannelState,
    clk2: ChannelState,
}

impl Channels {
    pub(crate) const fn new(drive: DriveStrength) -> Self {
        Channels {
            clk0: ChannelState::new(drive),
            clk1: ChannelState::new(drive),
            clk2: ChannelState::new(drive),
        }
    }

    pub(crate) fn get(&self, clk: ClockOutput) -> &ChannelState {
        match clk {
            ClockOutput::Clk0 => &self.clk0,
            ClockOutput::Clk1 => &self.clk1,
            ClockOutput::Clk2 => &self.clk2,
        }
    }

    pub(crate) fn get_mut(&mut self, clk: ClockOutput) -> &mut ChannelState {
        match clk {
            ClockOutput::Clk0 => &mut self.clk0,
            ClockOutput::Clk1 => &mut self.clk1,
            ClockOutput::Clk2 => &mut self.clk2,
        }
    }

    pub(crate) fn invalidate_all(&mut self) {
        for &clk in ClockOutput::ALL.iter() {
            self.get_mut(clk).invalidate();
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum OutputMode {
    Independent,
    /// `CLK0` and `CLK1` share PLL A and a divider, a quarter period apart.
    Quadrature { inverse_phase: bool },
}

impl<T: Transport> Si5351Device<T> {
    pub(crate) fn apply_frequencies(&mut self, f0: u32, f1: u32, f2: u32) -> Result<PLLResetBits, Error> {
        self.pending_reset = PLLResetBits::empty();
        self.leave_quadrature()?;

        if self.channels.get(ClockOutput::Clk0).changed(f0) {
            self.channels.get_mut(ClockOutput::Clk0).request(f0);
            self.guarded(&[ClockOutput::Clk0], |dev| {
                dev.update_independent(ClockOutput::Clk0, f0)
            })?;
        }

        let f1_changed = self.channels.get(ClockOutput::Clk1).changed(f1);
        if f1_changed || self.channels.get(ClockOutput::Clk2).changed(f2) {
            self.channels.get_mut(ClockOutput::Clk1).request(f1);
            self.channels.get_mut(ClockOutput::Clk2).request(f2);
            self.guarded(&[ClockOutput::Clk1, ClockOutput::Clk2], |dev| {
                dev.update_shared(f1, f2, f1_changed)
            })?;
        }

        self.flush_pll_reset()
    }

    pub(crate) fn apply_quadrature(&mut self, f01: u32, f2: u32, inverse_phase: bool) -> Result<PLLResetBits, Error> {
        self.pending_reset = PLLResetBits::empty();

        let mode = OutputMode::Quadrature { inverse_phase };
        if self.mode != mode {
            self.channels.get_mut(ClockOutput::Clk0).invalidate();
            self.channels.get_mut(ClockOutput::Clk1).invalidate();
            self.mode = mode;
        }

        let pair_changed = self.channels.get(ClockOutput::Clk0).changed(f01)
            || self.channels.get(ClockOutput::Clk1).changed(f01);
        if pair_changed {
            self.channels.get_mut(ClockOutput::Clk0).request(f01);
            self.channels.get_mut(ClockOutput::Clk1).request(f01);
            self.guarded(&[ClockOutput::Clk0, ClockOutput::Clk1], |dev| {
                dev.update_quadrature(f01, inverse_phase)
            })?;
        }

        if self.channels.get(ClockOutput::Clk2).changed(f2) {
            self.channels.get_mut(ClockOutput::Clk2).request(f2);
            self.guarded(&[ClockOutput::Clk2], |dev| {
                dev.update_independent(ClockOutput::Clk2, f2)
            })?;
        }

        self.flush_pll_reset()
    }

    /// Zeroes the phase offsets and hands `CLK0`/`CLK1` back to their own PLLs.
    pub(crate) fn leave_quadrature(&mut self) -> Result<(), Error> {
        if self.mode == OutputMode::Independent {
            return Ok(());
        }
        self.channels.get_mut(ClockOutput::Clk0).invalidate();
        self.channels.get_mut(ClockOutput::Clk1).invalidate();
        self.mode = OutputMode::Independent;
        self.write_phase(ClockOutput::Clk0, 0)?;
        self.write_phase(ClockOutput::Clk1, 0)
    }

    /// Runs `update`; if the bus fails part way, the outputs it was
    /// reprogramming are left invalidated instead of half configured.
    fn guarded<F>(&mut self, outputs: &[ClockOutput], update: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let result = update(self);
        if result.is_err() {
            for &clk in outputs {
                self.channels.get_mut(clk).invalidate();
            }
        }
        result
    }

    fn flush_pll_reset(&mut self) -> Result<PLLResetBits, Error> {
        let reset = self.pending_reset;
        if !reset.is_empty() {
            #[cfg(feature = "defmt")]
            defmt::debug!("si5351: PLL reset {=u8:#x}", reset.bits());
            if let Err(err) = self.write_register(Register::PLLReset, reset.bits()) {
                self.pending_reset = PLLResetBits::empty();
                self.invalidate_reset_outputs(reset);
                return Err(err);
            }
        }
        self.pending_reset = PLLResetBits::empty();
        Ok(reset)
    }

    /// Outputs whose PLL was retuned without the reset that should have followed.
    fn invalidate_reset_outputs(&mut self, reset: PLLResetBits) {
        let quadrature = self.mode != OutputMode::Independent;
        if reset.contains(PLLResetBits::PLLA_RST) {
            self.channels.get_mut(ClockOutput::Clk0).invalidate();
            if quadrature {
                self.channels.get_mut(ClockOutput::Clk1).invalidate();
            }
        }
        if reset.contains(PLLResetBits::PLLB_RST) {
            if !quadrature {
                self.channels.get_mut(ClockOutput::Clk1).invalidate();
            }
            self.channels.get_mut(ClockOutput::Clk2).invalidate();
        }
    }

    pub(crate) fn disable_output(&mut self, clk: ClockOutput) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        defmt::debug!("si5351: {} off", clk);
        self.channels.get_mut(clk).clear_divider();
        self.write_register(clk.register(), ClockControlBits::CLK_PDN.bits())
    }

    fn update_independent(&mut self, clk: ClockOutput, freq: u32) -> Result<(), Error> {
        if freq == 0 {
            return self.disable_output(clk);
        }
        self.program_integer(clk, clk.pll(), freq).map(|_| ())
    }

    /// `CLK1` owns PLL B; `CLK2` divides whatever VCO frequency `CLK1` left
    /// behind, or takes PLL B over when `CLK1` is off.
    fn update_shared(&mut self, f1: u32, f2: u32, f1_changed: bool) -> Result<(), Error> {
        if f1 == 0 {
            self.disable_output(ClockOutput::Clk1)?;
        }
        if f2 == 0 {
            self.disable_output(ClockOutput::Clk2)?;
        }

        let shared_vco = if f1 == 0 {
            None
        } else if f1_changed {
            self.program_integer(ClockOutput::Clk1, PLL::B, f1)?
        } else if self.channels.get(ClockOutput::Clk1).is_locked() {
            Some(self.pll_b_freq)
        } else {
            None
        };

        if f2 != 0 {
            match shared_vco {
                Some(vco_freq) => self.program_fractional(ClockOutput::Clk2, vco_freq, f2)?,
                None => {
                    self.program_integer(ClockOutput::Clk2, PLL::B, f2)?;
                }
            }
        }
        Ok(())
    }

    /// Returns the VCO frequency `pll` was tuned to, `None` if the output had to be turned off.
    fn program_integer(&mut self, clk: ClockOutput, pll: PLL, freq: u32) -> Result<Option<u32>, Error> {
        let last = self.channels.get(clk).last_integer();
        let solution = match solver::solve_integer(freq, last, self.config.vco()) {
            Some(solution) => solution,
            None => {
                self.disable_output(clk)?;
                return Ok(None);
            }
        };

        let feedback = MultisynthParams::feedback(solution.vco_freq, self.config.xtal_freq()).pack();
        let output = MultisynthParams::integer(solution.divider.divider as u32).pack();
        let (feedback, output) = match (feedback, output) {
            (Ok(feedback), Ok(output)) => (feedback, output),
            _ => {
                self.disable_output(clk)?;
                return Ok(None);
            }
        };

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "si5351: {} {=u32} Hz, VCO {=u32} Hz, {}",
            clk,
            freq,
            solution.vco_freq,
            solution.divider
        );

        self.write_params(pll.multisynth(), &feedback, OutputDivider::Div1, false)?;
        if solution.divider != last {
            let drive = self.channels.get(clk).drive;
            self.write_params(
                clk.multisynth(),
                &output,
                solution.divider.r_div,
                solution.divider.divider == 4,
            )?;
            self.write_register(clk.register(), clock_control(drive, pll, true))?;
            self.pending_reset |= pll.reset_bit();
        }

        self.channels.get_mut(clk).set_integer(solution.divider);
        if pll == PLL::B {
            self.pll_b_freq = solution.vco_freq;
        }
        Ok(Some(solution.vco_freq))
    }

    fn program_fractional(&mut self, clk: ClockOutput, vco_freq: u32, freq: u32) -> Result<(), Error> {
        let solution = match solver::solve_fractional(vco_freq, freq) {
            Some(solution) => solution,
            None => return self.disable_output(clk),
        };
        let params = MultisynthParams {
            a: solution.integer,
            b: solution.numerator,
            c: solution.denominator,
        };
        let packed = match params.pack() {
            Ok(packed) => packed,
            Err(_) => return self.disable_output(clk),
        };

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "si5351: {} {=u32} Hz from VCO {=u32} Hz, {=u32} + {=u32}/{=u32}, {}",
            clk,
            freq,
            vco_freq,
            solution.integer,
            solution.numerator,
            solution.denominator,
            solution.r_div
        );

        let drive = self.channels.get(clk).drive;
        self.write_params(clk.multisynth(), &packed, solution.r_div, false)?;
        self.write_register(clk.register(), clock_control(drive, PLL::B, solution.is_integer()))?;
        self.channels
            .get_mut(clk)
            .set_fractional(solution.integer as u16, solution.r_div);
        Ok(())
    }

    fn update_quadrature(&mut self, freq: u32, inverse_phase: bool) -> Result<(), Error> {
        let pair = [ClockOutput::Clk0, ClockOutput::Clk1];

        let solution = if freq == 0 {
            None
        } else {
            solver::solve_quadrature(freq, self.config.vco())
        };
        let planned = solution.and_then(|solution| {
            let feedback = MultisynthParams::feedback(solution.vco_freq, self.config.xtal_freq())
                .pack()
                .ok()?;
            let output = MultisynthParams::integer(solution.divider as u32).pack().ok()?;
            Some((solution, feedback, output))
        });
        let (solution, feedback, output): (_, PackedParams, PackedParams) = match planned {
            Some(planned) => planned,
            None => {
                for &clk in pair.iter() {
                    self.disable_output(clk)?;
                }
                return Ok(());
            }
        };

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "si5351: quadrature {=u32} Hz, VCO {=u32} Hz, divider {=u16}",
            freq,
            solution.vco_freq,
            solution.divider
        );

        let divider = IntegerDivider {
            divider: solution.divider,
            r_div: OutputDivider::Div1,
        };
        // both outputs share the divider; either one out of date rewrites the pair
        let stale_pair = pair
            .iter()
            .any(|&clk| self.channels.get(clk).last_integer() != divider);

        self.write_params(PLL::A.multisynth(), &feedback, OutputDivider::Div1, false)?;
        if stale_pair {
            let phases = if inverse_phase {
                [solution.phase, 0]
            } else {
                [0, solution.phase]
            };
            for (&clk, &phase) in pair.iter().zip(phases.iter()) {
                let drive = self.channels.get(clk).drive;
                self.write_params(clk.multisynth(), &output, OutputDivider::Div1, solution.divider == 4)?;
                self.write_register(clk.register(), clock_control(drive, PLL::A, true))?;
                self.write_phase(clk, phase)?;
            }
            self.pending_reset |= PLLResetBits::PLLA_RST;
        }

        for &clk in pair.iter() {
            self.channels.get_mut(clk).set_integer(divider);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::registers::FRAC_DENOM;
    use crate::solver::SynthesizerConfig;
    use crate::Si5351;

    const CLK0_CONTROL: u8 = 16;
    const CLK1_CONTROL: u8 = 17;
    const CLK2_CONTROL: u8 = 18;
    const MSNA: u8 = 26;
    const MSNB: u8 = 34;
    const MS0: u8 = 42;
    const MS1: u8 = 50;
    const MS2: u8 = 58;
    const CLK0_PHASE: u8 = 165;
    const CLK1_PHASE: u8 = 166;
    const PLL_RESET: u8 = 177;

    const PDN: u8 = 0x80;

    fn device() -> Si5351Device<MockTransport> {
        let mut dev = Si5351Device::new(MockTransport::new(), false, SynthesizerConfig::default());
        dev.setup(DriveStrength::_8, DriveStrength::_8, DriveStrength::_8)
            .unwrap();
        dev.transport_mut().clear();
        dev
    }

    fn decode(block: &[u8]) -> PackedParams {
        PackedParams {
            p1: ((block[2] as u32 & 0x03) << 16) | ((block[3] as u32) << 8) | block[4] as u32,
            p2: ((block[5] as u32 & 0x0F) << 16) | ((block[6] as u32) << 8) | block[7] as u32,
            p3: ((block[5] as u32 & 0xF0) << 12) | ((block[0] as u32) << 8) | block[1] as u32,
        }
    }

    #[test]
    fn single_output_on_pll_a() {
        let mut dev = device();
        let reset = dev.set_frequencies(10_000_000, 0, 0).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST);

        let clk0 = dev.channel(ClockOutput::Clk0);
        assert!(clk0.is_locked());
        let vco = clk0.divider() as u64 * 10_000_000 * clk0.r_div().denominator() as u64;
        assert!(600_000_000 <= vco && vco <= 900_000_000);
        assert!(!dev.is_locked(ClockOutput::Clk1));
        assert!(!dev.is_locked(ClockOutput::Clk2));

        let bus = dev.transport_mut();
        assert_eq!(bus.writes_to(CLK1_CONTROL), vec![vec![PDN]]);
        assert_eq!(bus.writes_to(CLK2_CONTROL), vec![vec![PDN]]);
        assert_eq!(bus.writes_to(CLK0_CONTROL), vec![vec![0x4F]]);
        assert_eq!(bus.writes_to(PLL_RESET), vec![vec![0x20]]);
        assert!(bus.writes_to(MSNB).is_empty());

        let ms0 = decode(&bus.writes_to(MS0)[0]).unpack();
        assert_eq!(ms0, MultisynthParams::integer(74));
        let msna = decode(&bus.writes_to(MSNA)[0]).unpack();
        assert_eq!(msna, MultisynthParams::feedback(740_000_000, 25_000_000));
    }

    #[test]
    fn repeated_call_is_silent() {
        let mut dev = device();
        assert!(!dev.set_frequencies(10_000_000, 5_000_000, 2_500_000).unwrap().is_empty());
        dev.transport_mut().clear();

        let reset = dev.set_frequencies(10_000_000, 5_000_000, 2_500_000).unwrap();
        assert!(reset.is_empty());
        assert!(dev.transport_mut().transactions.is_empty());
    }

    #[test]
    fn small_step_retunes_pll_only() {
        let mut dev = device();
        dev.set_frequencies(10_000_000, 0, 0).unwrap();
        dev.transport_mut().clear();

        let reset = dev.set_frequencies(10_001_000, 0, 0).unwrap();
        assert!(reset.is_empty());
        assert_eq!(dev.transport_mut().registers_written(), vec![MSNA]);
    }

    #[test]
    fn large_step_rewrites_multisynth_and_resets() {
        let mut dev = device();
        dev.set_frequencies(10_000_000, 0, 0).unwrap();
        dev.transport_mut().clear();

        let reset = dev.set_frequencies(14_000_000, 0, 0).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST);
        assert_eq!(
            dev.transport_mut().registers_written(),
            vec![MSNA, MS0, CLK0_CONTROL, PLL_RESET]
        );
    }

    #[test]
    fn second_output_divides_shared_vco() {
        let mut dev = device();
        let reset = dev.set_frequencies(0, 5_000_000, 2_500_000).unwrap();
        assert_eq!(reset, PLLResetBits::PLLB_RST);

        let bus = dev.transport_mut();
        // PLL B is tuned once, for CLK1
        assert_eq!(bus.writes_to(MSNB).len(), 1);
        assert_eq!(
            decode(&bus.writes_to(MSNB)[0]).unpack(),
            MultisynthParams::feedback(750_000_000, 25_000_000)
        );
        assert_eq!(bus.writes_to(CLK1_CONTROL), vec![vec![0x6F]]);

        let ms2 = &bus.writes_to(MS2)[0];
        assert_eq!(ms2[2] & 0x70, (OutputDivider::Div8 as u8) << 4);
        assert_eq!(
            decode(ms2).unpack(),
            MultisynthParams {
                a: 37,
                b: 524_287,
                c: FRAC_DENOM
            }
        );
        // fractional: no MS_INT
        assert_eq!(bus.writes_to(CLK2_CONTROL), vec![vec![0x2F]]);
        assert_eq!(dev.channel(ClockOutput::Clk2).mode(), MultisynthMode::Fractional);
        assert_eq!(dev.channel(ClockOutput::Clk0).freq(), 0);
    }

    #[test]
    fn second_output_follows_retuned_vco() {
        let mut dev = device();
        dev.set_frequencies(0, 5_000_000, 2_500_000).unwrap();
        dev.transport_mut().clear();

        // CLK1 keeps its divider, so PLL B moves and CLK2 is recomputed
        let reset = dev.set_frequencies(0, 5_001_000, 2_500_000).unwrap();
        assert!(reset.is_empty());
        let bus = dev.transport_mut();
        assert_eq!(bus.registers_written(), vec![MSNB, MS2, CLK2_CONTROL]);
        let ms2 = decode(&bus.writes_to(MS2)[0]).unpack();
        let expected = solver::solve_fractional(150 * 5_001_000, 2_500_000).unwrap();
        assert_eq!(ms2.a, expected.integer);
        assert_eq!(ms2.b, expected.numerator);
    }

    #[test]
    fn second_output_alone_gets_its_own_pll() {
        let mut dev = device();
        let reset = dev.set_frequencies(0, 0, 2_500_000).unwrap();
        assert_eq!(reset, PLLResetBits::PLLB_RST);

        let clk2 = *dev.channel(ClockOutput::Clk2);
        assert_eq!(clk2.mode(), MultisynthMode::Integer);
        assert_eq!(clk2.divider(), 300);
        let bus = dev.transport_mut();
        assert_eq!(bus.writes_to(CLK2_CONTROL), vec![vec![0x6F]]);
        assert_eq!(bus.writes_to(MSNB).len(), 1);
    }

    #[test]
    fn turning_first_shared_output_off_moves_pll_to_second() {
        let mut dev = device();
        dev.set_frequencies(0, 5_000_000, 2_500_000).unwrap();
        dev.transport_mut().clear();

        let reset = dev.set_frequencies(0, 0, 2_500_000).unwrap();
        assert_eq!(reset, PLLResetBits::PLLB_RST);
        assert!(!dev.is_locked(ClockOutput::Clk1));
        assert_eq!(dev.channel(ClockOutput::Clk2).mode(), MultisynthMode::Integer);
        assert_eq!(dev.transport_mut().writes_to(CLK1_CONTROL), vec![vec![PDN]]);
    }

    #[test]
    fn both_plls_reset_with_one_write() {
        let mut dev = device();
        let reset = dev.set_frequencies(10_000_000, 7_000_000, 0).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST | PLLResetBits::PLLB_RST);
        let bus = dev.transport_mut();
        assert_eq!(bus.writes_to(PLL_RESET), vec![vec![0xA0]]);
        assert_eq!(bus.registers_written().last(), Some(&PLL_RESET));
    }

    #[test]
    fn unreachable_frequency_turns_output_off() {
        let mut dev = device();
        dev.set_frequencies(10_000_000, 0, 0).unwrap();
        assert!(dev.is_locked(ClockOutput::Clk0));
        dev.transport_mut().clear();

        let reset = dev.set_frequencies(200_000_000, 0, 0).unwrap();
        assert!(reset.is_empty());
        assert!(!dev.is_locked(ClockOutput::Clk0));
        assert_eq!(dev.transport_mut().registers_written(), vec![CLK0_CONTROL]);
        assert_eq!(dev.transport_mut().writes_to(CLK0_CONTROL), vec![vec![PDN]]);

        // and comes back with a full reprogram
        let reset = dev.set_frequencies(10_000_000, 0, 0).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST);
        assert!(dev.is_locked(ClockOutput::Clk0));
    }

    #[test]
    fn unreachable_shared_frequency_turns_second_output_off() {
        let mut dev = device();
        dev.set_frequencies(0, 5_000_000, 100_000_000).unwrap();
        assert!(dev.is_locked(ClockOutput::Clk1));
        assert!(!dev.is_locked(ClockOutput::Clk2));
        assert_eq!(dev.transport_mut().writes_to(CLK2_CONTROL).last(), Some(&vec![PDN]));
    }

    #[test]
    fn quadrature_pair() {
        let mut dev = device();
        let reset = dev.set_frequencies_quadrature(7_100_000, 0, false).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST);

        let bus = dev.transport_mut();
        // 900 MHz / 7.1 MHz
        assert_eq!(bus.writes_to(CLK0_PHASE), vec![vec![0]]);
        assert_eq!(bus.writes_to(CLK1_PHASE), vec![vec![126]]);
        assert_eq!(bus.writes_to(CLK0_CONTROL), vec![vec![0x4F]]);
        assert_eq!(bus.writes_to(CLK1_CONTROL), vec![vec![0x4F]]);
        assert_eq!(decode(&bus.writes_to(MS0)[0]).unpack(), MultisynthParams::integer(126));
        assert_eq!(bus.writes_to(MS0), bus.writes_to(MS1));
        assert_eq!(
            decode(&bus.writes_to(MSNA)[0]).unpack(),
            MultisynthParams::feedback(126 * 7_100_000, 25_000_000)
        );
        assert!(dev.is_locked(ClockOutput::Clk0));
        assert!(dev.is_locked(ClockOutput::Clk1));
    }

    #[test]
    fn quadrature_tuning_within_band_skips_reset() {
        let mut dev = device();
        dev.set_frequencies_quadrature(7_100_000, 0, false).unwrap();
        dev.transport_mut().clear();

        let reset = dev.set_frequencies_quadrature(7_101_000, 0, false).unwrap();
        assert!(reset.is_empty());
        assert_eq!(dev.transport_mut().registers_written(), vec![MSNA]);
    }

    #[test]
    fn inverse_phase_swaps_offsets() {
        let mut dev = device();
        dev.set_frequencies_quadrature(7_100_000, 0, false).unwrap();
        dev.transport_mut().clear();

        let reset = dev.set_frequencies_quadrature(7_100_000, 0, true).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST);
        let bus = dev.transport_mut();
        assert_eq!(bus.writes_to(CLK0_PHASE), vec![vec![126]]);
        assert_eq!(bus.writes_to(CLK1_PHASE), vec![vec![0]]);
    }

    #[test]
    fn quadrature_out_of_band_turns_pair_off() {
        let mut dev = device();
        dev.set_frequencies_quadrature(1_999_999, 0, false).unwrap();
        assert!(!dev.is_locked(ClockOutput::Clk0));
        assert!(!dev.is_locked(ClockOutput::Clk1));
        let bus = dev.transport_mut();
        assert_eq!(bus.writes_to(CLK0_CONTROL), vec![vec![PDN]]);
        assert_eq!(bus.writes_to(CLK1_CONTROL), vec![vec![PDN]]);
    }

    #[test]
    fn third_output_stays_independent_in_quadrature() {
        let mut dev = device();
        let reset = dev.set_frequencies_quadrature(7_100_000, 10_000_000, false).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST | PLLResetBits::PLLB_RST);
        assert_eq!(dev.channel(ClockOutput::Clk2).mode(), MultisynthMode::Integer);
        assert_eq!(dev.transport_mut().writes_to(CLK2_CONTROL), vec![vec![0x6F]]);
    }

    #[test]
    fn leaving_quadrature_clears_phases() {
        let mut dev = device();
        dev.set_frequencies_quadrature(7_100_000, 0, false).unwrap();
        dev.transport_mut().clear();

        let reset = dev.set_frequencies(7_100_000, 7_100_000, 0).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST | PLLResetBits::PLLB_RST);
        let bus = dev.transport_mut();
        assert_eq!(bus.writes_to(CLK0_PHASE), vec![vec![0]]);
        assert_eq!(bus.writes_to(CLK1_PHASE), vec![vec![0]]);
        assert_eq!(bus.writes_to(CLK1_CONTROL), vec![vec![0x6F]]);
    }

    #[test]
    fn bus_failure_leaves_output_unlocked() {
        let mut dev = device();
        // transaction 0 is the PLL A feedback block
        dev.transport_mut().nack_transaction = Some(0);
        assert_eq!(
            dev.set_frequencies(10_000_000, 0, 0),
            Err(Error::CommunicationError)
        );
        assert!(!dev.is_locked(ClockOutput::Clk0));

        dev.transport_mut().nack_transaction = None;
        let reset = dev.set_frequencies(10_000_000, 0, 0).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST);
        assert!(dev.is_locked(ClockOutput::Clk0));
        assert_eq!(
            dev.transport_mut().writes_to(CLK0_CONTROL).last(),
            Some(&vec![(ClockControlBits::MS_INT | ClockControlBits::CLK_SRC_MS).bits() | 0x03])
        );
    }

    #[test]
    fn drive_change_in_quadrature_rewrites_pair() {
        let mut dev = device();
        dev.set_frequencies_quadrature(7_100_000, 0, false).unwrap();
        dev.set_power(ClockOutput::Clk1, DriveStrength::_2);
        assert!(!dev.is_locked(ClockOutput::Clk1));
        dev.transport_mut().clear();

        let reset = dev.set_frequencies_quadrature(7_100_000, 0, false).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST);
        assert!(dev.is_locked(ClockOutput::Clk1));
        let bus = dev.transport_mut();
        assert_eq!(bus.writes_to(CLK0_CONTROL), vec![vec![0x4F]]);
        assert_eq!(bus.writes_to(CLK1_CONTROL), vec![vec![0x4C]]);
        assert_eq!(bus.writes_to(CLK1_PHASE), vec![vec![126]]);
    }

    #[test]
    fn disabled_quadrature_output_comes_back_on_retune() {
        let mut dev = device();
        dev.set_frequencies_quadrature(7_100_000, 0, false).unwrap();
        dev.disable(ClockOutput::Clk1).unwrap();
        dev.transport_mut().clear();

        let reset = dev.set_frequencies_quadrature(7_101_000, 0, false).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST);
        assert!(dev.is_locked(ClockOutput::Clk1));
        assert_eq!(dev.transport_mut().writes_to(CLK1_CONTROL), vec![vec![0x4F]]);
    }

    #[test]
    fn failed_reset_write_forces_reprogram() {
        let mut dev = device();
        // MSNA, MS0, CLK0, CLK1, CLK2, then the reset
        dev.transport_mut().nack_transaction = Some(5);
        assert_eq!(
            dev.set_frequencies(10_000_000, 0, 0),
            Err(Error::CommunicationError)
        );
        assert!(dev.transport_mut().writes_to(PLL_RESET).is_empty());
        assert!(!dev.is_locked(ClockOutput::Clk0));

        dev.transport_mut().nack_transaction = None;
        dev.transport_mut().clear();
        let reset = dev.set_frequencies(10_000_000, 0, 0).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST);
        assert_eq!(
            dev.transport_mut().registers_written(),
            vec![MSNA, MS0, CLK0_CONTROL, PLL_RESET]
        );
        assert!(dev.is_locked(ClockOutput::Clk0));
    }

    #[test]
    fn failed_reset_write_in_quadrature_invalidates_pair() {
        let mut dev = device();
        // MSNA, MS0, CLK0, phase 0, MS1, CLK1, phase 1, CLK2, then the reset
        dev.transport_mut().nack_transaction = Some(8);
        assert_eq!(
            dev.set_frequencies_quadrature(7_100_000, 0, false),
            Err(Error::CommunicationError)
        );
        assert!(!dev.is_locked(ClockOutput::Clk0));
        assert!(!dev.is_locked(ClockOutput::Clk1));

        dev.transport_mut().nack_transaction = None;
        let reset = dev.set_frequencies_quadrature(7_100_000, 0, false).unwrap();
        assert_eq!(reset, PLLResetBits::PLLA_RST);
        assert!(dev.is_locked(ClockOutput::Clk0));
        assert!(dev.is_locked(ClockOutput::Clk1));
    }
}
