/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
use crate::registers::{ClockControlBits, DeviceStatusBits, FanoutBits, PLLResetBits, PackedParams, ParameterBlock, Register};
use crate::solver::{SynthesizerConfig, VcoRange};
use crate::synth::{ChannelState, Channels, OutputMode};
use crate::transport::Transport;
use crate::{ClockOutput, CrystalLoad, DriveStrength, Error, OutputDivider, ADDRESS};

/// Si5351A with a fixed two-PLL, three-output frequency plan.
pub struct Si5351Device<T> {
    pub(crate) transport: T,
    address: u8,
    pub(crate) config: SynthesizerConfig,
    pub(crate) channels: Channels,
    pub(crate) mode: OutputMode,
    /// VCO frequency PLL B was last tuned to.
    pub(crate) pll_b_freq: u32,
    pub(crate) pending_reset: PLLResetBits,
}

pub trait Si5351 {
    /// Powers all outputs down, sets their drive strength and the disabled
    /// state to low. The next frequency call reprograms everything.
    fn setup(&mut self, drive0: DriveStrength, drive1: DriveStrength, drive2: DriveStrength) -> Result<(), Error>;

    /// Changes the reference crystal frequency, e.g. after calibration.
    fn set_xtal_freq(&mut self, xtal_freq: u32) -> Result<(), Error>;
    fn set_vco_range(&mut self, min: u32, max: u32) -> Result<(), Error>;
    /// Takes effect with the next frequency call, which reprograms `clk`.
    fn set_power(&mut self, clk: ClockOutput, drive: DriveStrength);

    /// Sets `CLK0`; the other outputs keep their last requested frequency.
    fn set_frequency(&mut self, f0: u32) -> Result<PLLResetBits, Error>;
    /// Sets `CLK0` and `CLK1`; `CLK2` keeps its last requested frequency.
    fn set_frequency_pair(&mut self, f0: u32, f1: u32) -> Result<PLLResetBits, Error>;
    /// Sets all three outputs in Hz, 0 turning an output off.
    ///
    /// Returns the PLLs that were reset to get there.
    fn set_frequencies(&mut self, f0: u32, f1: u32, f2: u32) -> Result<PLLResetBits, Error>;
    /// Drives `CLK0` and `CLK1` at `f01`, `CLK1` lagging by 90°, or leading
    /// with `inverse_phase`. `CLK2` runs independently from PLL B.
    fn set_frequencies_quadrature(&mut self, f01: u32, f2: u32, inverse_phase: bool) -> Result<PLLResetBits, Error>;

    fn disable(&mut self, clk: ClockOutput) -> Result<(), Error>;
    /// `false` once the output had to be turned off, including for an unreachable frequency.
    fn is_locked(&self, clk: ClockOutput) -> bool;
    fn channel(&self, clk: ClockOutput) -> &ChannelState;

    /// Routes the crystal straight to all three outputs, for measuring it.
    fn output_crystal_frequency(&mut self) -> Result<(), Error>;
    fn set_crystal_load(&mut self, load: CrystalLoad) -> Result<(), Error>;
    fn read_device_status(&mut self) -> Result<DeviceStatusBits, Error>;
}

impl<T: Transport> Si5351Device<T> {
    /// Creates a new driver from a byte transport
    pub fn new(transport: T, address_bit: bool, config: SynthesizerConfig) -> Self {
        Si5351Device {
            transport,
            address: ADDRESS | if address_bit { 1 } else { 0 },
            config,
            channels: Channels::new(DriveStrength::default()),
            mode: OutputMode::Independent,
            pll_b_freq: 0,
            pending_reset: PLLResetBits::empty(),
        }
    }

    /// Adafruit breakout: address bit low, 25 MHz crystal.
    pub fn new_adafruit_module(transport: T) -> Self {
        Si5351Device::new(transport, false, SynthesizerConfig::default())
    }

    pub fn config(&self) -> &SynthesizerConfig {
        &self.config
    }

    pub fn release(self) -> T {
        self.transport
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// One write transaction starting at `reg`. The stop condition is always
    /// sent, even after a byte was not acknowledged.
    fn write_block(&mut self, reg: u8, bytes: &[u8]) -> Result<(), Error> {
        let mut ok = self.transport.begin_write(self.address) && self.transport.write(reg);
        for &byte in bytes {
            if !ok {
                break;
            }
            ok = self.transport.write(byte);
        }
        let stopped = self.transport.end();
        if ok && stopped {
            Ok(())
        } else {
            Err(Error::CommunicationError)
        }
    }

    pub(crate) fn write_register(&mut self, reg: Register, byte: u8) -> Result<(), Error> {
        self.write_block(reg.addr(), &[byte])
    }

    pub(crate) fn write_params<MS: ParameterBlock>(
        &mut self,
        ms: MS,
        params: &PackedParams,
        r_div: OutputDivider,
        divby4: bool,
    ) -> Result<(), Error> {
        self.write_block(ms.base_addr(), &params.to_block(r_div, divby4))
    }

    pub(crate) fn write_phase(&mut self, clk: ClockOutput, phase: u8) -> Result<(), Error> {
        let reg = clk.phase_register().ok_or(Error::InvalidParameter)?;
        self.write_register(reg, phase & 0b0111_1111)
    }

    fn read_register(&mut self, reg: Register) -> Result<u8, Error> {
        let mut ok = self.transport.begin_write(self.address) && self.transport.write(reg.addr());
        ok = ok && self.transport.begin_read(self.address);
        let byte = if ok { self.transport.read() } else { 0 };
        let stopped = self.transport.end();
        if ok && stopped {
            Ok(byte)
        } else {
            Err(Error::CommunicationError)
        }
    }
}

impl<T: Transport> Si5351 for Si5351Device<T> {
    fn setup(&mut self, drive0: DriveStrength, drive1: DriveStrength, drive2: DriveStrength) -> Result<(), Error> {
        self.channels = Channels::new(DriveStrength::default());
        self.mode = OutputMode::Independent;
        self.pll_b_freq = 0;

        let drives = [drive0, drive1, drive2];
        for (&clk, &drive) in ClockOutput::ALL.iter().zip(drives.iter()) {
            self.channels.get_mut(clk).set_drive(drive);
            self.write_register(clk.register(), ClockControlBits::CLK_PDN.bits())?;
        }
        self.write_register(Register::DisableState, 0)
    }

    fn set_xtal_freq(&mut self, xtal_freq: u32) -> Result<(), Error> {
        self.config.set_xtal_freq(xtal_freq)?;
        self.channels.invalidate_all();
        Ok(())
    }

    fn set_vco_range(&mut self, min: u32, max: u32) -> Result<(), Error> {
        self.config.set_vco(VcoRange::new(min, max)?);
        self.channels.invalidate_all();
        Ok(())
    }

    fn set_power(&mut self, clk: ClockOutput, drive: DriveStrength) {
        let channel = self.channels.get_mut(clk);
        channel.set_drive(drive);
        channel.invalidate();
    }

    fn set_frequency(&mut self, f0: u32) -> Result<PLLResetBits, Error> {
        let f1 = self.channels.get(ClockOutput::Clk1).freq();
        let f2 = self.channels.get(ClockOutput::Clk2).freq();
        self.apply_frequencies(f0, f1, f2)
    }

    fn set_frequency_pair(&mut self, f0: u32, f1: u32) -> Result<PLLResetBits, Error> {
        let f2 = self.channels.get(ClockOutput::Clk2).freq();
        self.apply_frequencies(f0, f1, f2)
    }

    fn set_frequencies(&mut self, f0: u32, f1: u32, f2: u32) -> Result<PLLResetBits, Error> {
        self.apply_frequencies(f0, f1, f2)
    }

    fn set_frequencies_quadrature(&mut self, f01: u32, f2: u32, inverse_phase: bool) -> Result<PLLResetBits, Error> {
        self.apply_quadrature(f01, f2, inverse_phase)
    }

    fn disable(&mut self, clk: ClockOutput) -> Result<(), Error> {
        self.channels.get_mut(clk).set_off();
        let result = self.disable_output(clk);
        if result.is_err() {
            self.channels.get_mut(clk).invalidate();
        }
        result
    }

    fn is_locked(&self, clk: ClockOutput) -> bool {
        self.channels.get(clk).is_locked()
    }

    fn channel(&self, clk: ClockOutput) -> &ChannelState {
        self.channels.get(clk)
    }

    fn output_crystal_frequency(&mut self) -> Result<(), Error> {
        self.leave_quadrature()?;
        self.channels.invalidate_all();

        for &clk in ClockOutput::ALL.iter() {
            let drive = self.channels.get(clk).drive();
            self.write_register(
                clk.register(),
                (ClockControlBits::CLK_SRC_XTAL | drive.control_bits()).bits(),
            )?;
            // R divider back to 1
            self.write_block(clk.multisynth().base_addr() + 2, &[0])?;
        }
        self.write_register(
            Register::FanoutEnable,
            (FanoutBits::CLKIN_FANOUT_EN | FanoutBits::XO_FANOUT_EN | FanoutBits::MS_FANOUT_EN).bits(),
        )
    }

    fn set_crystal_load(&mut self, load: CrystalLoad) -> Result<(), Error> {
        self.write_register(Register::CrystalLoad, load.bits())
    }

    fn read_device_status(&mut self) -> Result<DeviceStatusBits, Error> {
        Ok(DeviceStatusBits::from_bits_truncate(self.read_register(Register::DeviceStatus)?))
    }
}
