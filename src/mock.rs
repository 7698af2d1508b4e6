/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Recording transport for driver tests.

use crate::transport::Transport;

/// Records every completed write transaction as `[register, data...]`.
pub struct MockTransport {
    pub address: Option<u8>,
    pub transactions: Vec<Vec<u8>>,
    pub registers: [u8; 256],
    /// Fail the byte writes of the transaction with this index.
    pub nack_transaction: Option<usize>,
    current: Vec<u8>,
    pointer: usize,
    started: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            address: None,
            transactions: Vec::new(),
            registers: [0; 256],
            nack_transaction: None,
            current: Vec::new(),
            pointer: 0,
            started: 0,
        }
    }

    /// Completed writes to `register`, data bytes only.
    pub fn writes_to(&self, register: u8) -> Vec<Vec<u8>> {
        self.transactions
            .iter()
            .filter(|t| t[0] == register)
            .map(|t| t[1..].to_vec())
            .collect()
    }

    pub fn registers_written(&self) -> Vec<u8> {
        self.transactions.iter().map(|t| t[0]).collect()
    }

    /// Forgets recorded transactions and restarts transaction numbering.
    pub fn clear(&mut self) {
        self.transactions.clear();
        self.started = 0;
    }
}

impl Transport for MockTransport {
    fn begin_write(&mut self, address: u8) -> bool {
        self.address = Some(address);
        self.current.clear();
        self.started += 1;
        true
    }

    fn write(&mut self, byte: u8) -> bool {
        if self.nack_transaction == Some(self.started - 1) {
            return false;
        }
        self.current.push(byte);
        true
    }

    fn begin_read(&mut self, address: u8) -> bool {
        self.pointer = self.current.first().copied().unwrap_or(0) as usize;
        self.current.clear();
        self.address == Some(address)
    }

    fn read_continued(&mut self, _last: bool) -> u8 {
        let byte = self.registers[self.pointer % 256];
        self.pointer += 1;
        byte
    }

    fn end(&mut self) -> bool {
        if !self.current.is_empty() {
            self.transactions.push(core::mem::take(&mut self.current));
        }
        true
    }
}
