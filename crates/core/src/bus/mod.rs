use crate::memory::LinearMemory;
use crate::peripherals::host::HostSignal;
use crate::peripherals::uart::Uart;
use crate::{Peripheral, SimResult, SimulationError};
use anyhow::Context;
use cacheprobe_config::BoardDescriptor;
use cacheprobe_diag::board;

pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub dev: Box<dyn Peripheral>,
}

impl PeripheralEntry {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && self.base.checked_add(self.size).map_or(true, |end| addr < end)
    }
}

pub struct SystemBus {
    pub scratch: LinearMemory,
    pub peripherals: Vec<PeripheralEntry>,
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemBus {
    /// Reference board: UART, host signal and 64 KiB of scratch.
    pub fn new() -> Self {
        Self::with_layout(
            board::UART_TX as u64,
            board::HOST_SIGNAL as u64,
            board::SCRATCH_BASE as u64,
            board::SCRATCH_SIZE,
        )
    }

    pub fn from_config(board: &BoardDescriptor) -> anyhow::Result<Self> {
        board.validate()?;
        let size = board.scratch_size()?;
        let size = usize::try_from(size)
            .with_context(|| format!("Scratch size {} does not fit in host memory", size))?;
        tracing::debug!(
            "Board '{}': scratch {:#x}+{:#x}, uart {:#x}, host {:#x}",
            board.name,
            board.scratch.base,
            size,
            board.uart_tx,
            board.host_signal
        );
        Ok(Self::with_layout(
            board.uart_tx,
            board.host_signal,
            board.scratch.base,
            size,
        ))
    }

    fn with_layout(uart_tx: u64, host_signal: u64, scratch_base: u64, scratch_size: usize) -> Self {
        Self {
            scratch: LinearMemory::new(scratch_size, scratch_base),
            peripherals: vec![
                PeripheralEntry {
                    name: "uart".to_string(),
                    base: uart_tx,
                    size: 0x08,
                    dev: Box::new(Uart::new()),
                },
                PeripheralEntry {
                    name: "host".to_string(),
                    base: host_signal,
                    size: 0x08,
                    dev: Box::new(HostSignal::new()),
                },
            ],
        }
    }

    fn find_peripheral(&self, addr: u64) -> Option<&PeripheralEntry> {
        self.peripherals.iter().find(|p| p.contains(addr))
    }

    fn find_peripheral_mut(&mut self, addr: u64) -> Option<&mut PeripheralEntry> {
        self.peripherals.iter_mut().find(|p| p.contains(addr))
    }

    fn device<T: 'static>(&self, name: &str) -> Option<&T> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<T>())
    }

    fn device_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<T>())
    }

    pub fn uart(&self) -> Option<&Uart> {
        self.device("uart")
    }

    pub fn uart_mut(&mut self) -> Option<&mut Uart> {
        self.device_mut("uart")
    }

    pub fn host_signal(&self) -> Option<&HostSignal> {
        self.device("host")
    }

    /// Resets every peripheral. Scratch contents are left as they are.
    pub fn reset_peripherals(&mut self) {
        for p in &mut self.peripherals {
            p.dev.reset();
        }
    }
}

impl crate::Bus for SystemBus {
    fn read_u8(&self, addr: u64) -> SimResult<u8> {
        if let Some(byte) = self.scratch.read_u8(addr) {
            return Ok(byte);
        }
        if let Some(p) = self.find_peripheral(addr) {
            return p.dev.read(addr - p.base);
        }
        Err(SimulationError::MemoryViolation(addr))
    }

    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()> {
        if self.scratch.write_u8(addr, value) {
            return Ok(());
        }
        if let Some(p) = self.find_peripheral_mut(addr) {
            let offset = addr - p.base;
            return p.dev.write(offset, value);
        }
        Err(SimulationError::MemoryViolation(addr))
    }

    fn read_u64(&self, addr: u64) -> SimResult<u64> {
        if let Some(word) = self.scratch.read_u64(addr) {
            return Ok(word);
        }
        if self.find_peripheral(addr).is_some() {
            let mut bytes = [0u8; 8];
            for (i, b) in bytes.iter_mut().enumerate() {
                *b = self.read_u8(addr + i as u64)?;
            }
            return Ok(u64::from_le_bytes(bytes));
        }
        Err(SimulationError::MemoryViolation(addr))
    }

    // Word writes reach a peripheral as one access, not eight byte writes.
    fn write_u64(&mut self, addr: u64, value: u64) -> SimResult<()> {
        if self.scratch.write_u64(addr, value) {
            return Ok(());
        }
        if let Some(p) = self.find_peripheral_mut(addr) {
            let offset = addr - p.base;
            return p.dev.write_u64(offset, value);
        }
        Err(SimulationError::MemoryViolation(addr))
    }
}
