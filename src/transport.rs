/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Byte-level two-wire bus access.

use embedded_hal::blocking::i2c::{Write, WriteRead};

/// Byte-oriented I²C master.
///
/// Addresses are 7-bit. Every `begin_*` must be paired with an [`end`](Transport::end),
/// and everything in between goes out as one bus transaction.
pub trait Transport {
    /// Start condition and address byte for a write. `true` on acknowledge.
    fn begin_write(&mut self, address: u8) -> bool;

    /// `true` if the target acknowledged `byte`.
    fn write(&mut self, byte: u8) -> bool;

    /// (Repeated) start condition and address byte for a read. `true` on acknowledge.
    fn begin_read(&mut self, address: u8) -> bool;

    /// Reads the last byte of a read sequence.
    fn read(&mut self) -> u8 {
        self.read_continued(true)
    }

    /// Reads one byte, acknowledging it unless it is the `last` one.
    fn read_continued(&mut self, last: bool) -> u8;

    /// Stop condition. `false` if the transaction failed in a way only visible at this point.
    fn end(&mut self) -> bool;
}

const BUFFER_SIZE: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Writing,
    Reading,
}

/// [`Transport`] over a blocking `embedded-hal` I²C peripheral.
///
/// Writes are collected until [`end`](Transport::end) and then sent as a
/// single bus write, so a parameter block never reaches the chip in pieces.
/// Each byte read is a separate `write_read` of the register pointer, which
/// is then advanced, matching the device's auto-increment.
pub struct HalI2c<I2C> {
    i2c: I2C,
    address: u8,
    state: State,
    buffer: [u8; BUFFER_SIZE],
    len: usize,
    failed: bool,
}

impl<I2C, E> HalI2c<I2C>
where
    I2C: WriteRead<Error = E> + Write<Error = E>,
{
    pub fn new(i2c: I2C) -> Self {
        HalI2c {
            i2c,
            address: 0,
            state: State::Idle,
            buffer: [0; BUFFER_SIZE],
            len: 0,
            failed: false,
        }
    }

    /// Gives the peripheral back.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> Transport for HalI2c<I2C>
where
    I2C: WriteRead<Error = E> + Write<Error = E>,
{
    fn begin_write(&mut self, address: u8) -> bool {
        self.address = address;
        self.state = State::Writing;
        self.len = 0;
        self.failed = false;
        true
    }

    fn write(&mut self, byte: u8) -> bool {
        if self.state != State::Writing || self.len == BUFFER_SIZE {
            self.failed = true;
            return false;
        }
        self.buffer[self.len] = byte;
        self.len += 1;
        true
    }

    fn begin_read(&mut self, address: u8) -> bool {
        // a register pointer is required, there is no bare read here
        if self.state != State::Writing || self.len == 0 || address != self.address {
            self.failed = true;
            return false;
        }
        self.state = State::Reading;
        true
    }

    fn read_continued(&mut self, _last: bool) -> u8 {
        if self.state != State::Reading || self.failed {
            self.failed = true;
            return 0;
        }
        let mut byte = [0u8; 1];
        match self
            .i2c
            .write_read(self.address, &self.buffer[..self.len], &mut byte)
        {
            Ok(()) => {
                self.buffer[0] = self.buffer[0].wrapping_add(1);
                byte[0]
            }
            Err(_) => {
                self.failed = true;
                0
            }
        }
    }

    fn end(&mut self) -> bool {
        let ok = match self.state {
            State::Writing if !self.failed => {
                self.i2c.write(self.address, &self.buffer[..self.len]).is_ok()
            }
            State::Reading => !self.failed,
            _ => false,
        };
        self.state = State::Idle;
        self.len = 0;
        self.failed = false;
        ok
    }
}
