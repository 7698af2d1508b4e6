/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Bit-banged I²C master for boards where the Si5351 is not on a hardware I²C peripheral.

use crate::transport::Transport;
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};

/// Default time a line is held, in µs, for a bus clock of roughly 100 kHz.
pub const DEFAULT_DELAY_US: u16 = 4;

/// I²C master driving two open-drain lines.
///
/// `set_high` must release the line and let the pull-up raise it, `set_low`
/// must drive it low. Each line change is made inside a critical section so
/// that an interrupt cannot stretch half a bit.
pub struct SoftI2c<SDA, SCL, D> {
    sda: SDA,
    scl: SCL,
    delay: D,
    delay_us: u16,
    fault: bool,
}

impl<SDA, SCL, D> SoftI2c<SDA, SCL, D>
where
    SDA: OutputPin + InputPin,
    SCL: OutputPin + InputPin,
    D: DelayUs<u16>,
{
    pub fn new(sda: SDA, scl: SCL, delay: D) -> Self {
        SoftI2c {
            sda,
            scl,
            delay,
            delay_us: DEFAULT_DELAY_US,
            fault: false,
        }
    }

    pub fn with_delay_us(mut self, delay_us: u16) -> Self {
        self.delay_us = delay_us;
        self
    }

    /// Releases both lines. `false` if either stays low, which means a
    /// stuck bus or missing pull-ups.
    pub fn init(&mut self) -> bool {
        self.fault = false;
        self.set_sda(true);
        self.set_scl(true);
        self.wait();
        let idle = self.sda.is_high().unwrap_or(false) && self.scl.is_high().unwrap_or(false);
        idle && !self.fault
    }

    pub fn release(self) -> (SDA, SCL, D) {
        (self.sda, self.scl, self.delay)
    }

    fn set_sda(&mut self, high: bool) {
        let ok = drive(&mut self.sda, high);
        self.fault |= !ok;
    }

    fn set_scl(&mut self, high: bool) {
        let ok = drive(&mut self.scl, high);
        self.fault |= !ok;
    }

    fn sda_is_high(&mut self) -> bool {
        match self.sda.is_high() {
            Ok(high) => high,
            Err(_) => {
                self.fault = true;
                true
            }
        }
    }

    fn wait(&mut self) {
        self.delay.delay_us(self.delay_us);
    }

    fn wait_half(&mut self) {
        self.delay.delay_us(self.delay_us / 2);
    }

    fn start(&mut self, address_byte: u8) -> bool {
        self.set_sda(false);
        self.wait();
        self.set_scl(false);
        self.write(address_byte)
    }
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) -> bool {
    critical_section::with(|_| {
        if high {
            pin.set_high().is_ok()
        } else {
            pin.set_low().is_ok()
        }
    })
}

impl<SDA, SCL, D> Transport for SoftI2c<SDA, SCL, D>
where
    SDA: OutputPin + InputPin,
    SCL: OutputPin + InputPin,
    D: DelayUs<u16>,
{
    fn begin_write(&mut self, address: u8) -> bool {
        self.fault = false;
        self.start(address << 1)
    }

    fn write(&mut self, byte: u8) -> bool {
        let mut mask = 0x80;
        while mask != 0 {
            self.set_sda(byte & mask != 0);
            self.set_scl(true);
            self.wait();
            self.set_scl(false);
            mask >>= 1;
        }

        self.set_sda(true);
        self.set_scl(true);
        self.wait_half();
        let ack = !self.sda_is_high();
        self.set_scl(false);
        self.wait_half();
        self.set_sda(false);
        ack && !self.fault
    }

    fn begin_read(&mut self, address: u8) -> bool {
        self.set_sda(true);
        self.set_scl(true);
        self.wait();
        self.start((address << 1) | 1)
    }

    fn read_continued(&mut self, last: bool) -> u8 {
        let mut byte = 0;
        self.set_sda(true);
        for _ in 0..8 {
            byte <<= 1;
            self.wait();
            self.set_scl(true);
            if self.sda_is_high() {
                byte |= 1;
            }
            self.set_scl(false);
        }

        // NAK the last byte to end the read
        self.set_sda(last);
        self.set_scl(true);
        self.wait_half();
        self.set_scl(false);
        self.wait_half();
        self.set_sda(false);
        byte
    }

    fn end(&mut self) -> bool {
        self.set_sda(false);
        self.wait();
        self.set_scl(true);
        self.wait();
        self.set_sda(true);
        self.wait();
        !self.fault
    }
}
