use crate::SimResult;
use std::any::Any;

/// Word register read by the host to decide pass/fail.
#[derive(Debug, Default)]
pub struct HostSignal {
    latch: u64,
    writes: u32,
}

impl HostSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last word written, if any word write has happened since reset.
    pub fn value(&self) -> Option<u64> {
        (self.writes > 0).then_some(self.latch)
    }

    /// Number of full word writes since reset.
    pub fn writes(&self) -> u32 {
        self.writes
    }
}

impl crate::Peripheral for HostSignal {
    fn read(&self, offset: u64) -> SimResult<u8> {
        Ok(self.latch.to_le_bytes().get(offset as usize).copied().unwrap_or(0))
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        if offset < 8 {
            let mut bytes = self.latch.to_le_bytes();
            bytes[offset as usize] = value;
            self.latch = u64::from_le_bytes(bytes);
        }
        Ok(())
    }

    fn write_u64(&mut self, offset: u64, value: u64) -> SimResult<()> {
        if offset != 0 {
            return Ok(());
        }
        self.latch = value;
        self.writes += 1;
        tracing::info!("Host signal <- {:#x}", value);
        Ok(())
    }

    fn reset(&mut self) {
        self.latch = 0;
        self.writes = 0;
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}
