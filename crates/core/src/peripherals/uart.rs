use crate::SimResult;
use std::any::Any;
use std::io::{self, Write};

/// Transmit-only UART.
/// Writes to the data register (offset 0x0) are captured and, when echo is
/// enabled, copied to stdout.
#[derive(Debug, Default)]
pub struct Uart {
    tx: Vec<u8>,
    echo: bool,
}

impl Uart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Every byte written since the last reset, in write order.
    pub fn transmitted(&self) -> &[u8] {
        &self.tx
    }
}

impl crate::Peripheral for Uart {
    fn read(&self, offset: u64) -> SimResult<u8> {
        match offset {
            0x04 => Ok(0x01), // TX Ready (bit 0), never backpressures
            _ => Ok(0),
        }
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        if offset == 0x00 {
            self.tx.push(value);
            if self.echo {
                let mut out = io::stdout();
                let _ = out.write_all(&[value]);
                let _ = out.flush();
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.tx.clear();
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}
