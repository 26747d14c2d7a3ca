// CacheProbe - Cache Pattern Diagnostic
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::reg::Transmit;

/// Unbuffered text output on top of a transmit register.
pub struct Console<T> {
    tx: T,
}

impl<T: Transmit> Console<T> {
    pub const fn new(tx: T) -> Self {
        Self { tx }
    }

    pub fn putch(&mut self, byte: u8) {
        self.tx.transmit(byte);
    }

    pub fn puts(&mut self, s: &str) {
        for b in s.bytes() {
            self.putch(b);
        }
    }

    /// Emits `value` in decimal, most significant digit first, without
    /// leading zeros. `0` prints as a single `'0'`.
    pub fn print_number(&mut self, mut value: u64) {
        let mut power: u64 = 1;
        while let Some(next) = power.checked_mul(10) {
            if next > value {
                break;
            }
            power = next;
        }

        while power != 1 {
            let digit = value / power;
            value -= digit * power;
            power /= 10;
            self.putch(b'0' + digit as u8);
        }
        self.putch(b'0' + (value % 10) as u8);
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.tx
    }

    pub fn into_inner(self) -> T {
        self.tx
    }
}

impl<T: Transmit> core::fmt::Write for Console<T> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.puts(s);
        Ok(())
    }
}
