/// A simple flat memory storage
pub struct LinearMemory {
    pub data: Vec<u8>,
    pub base_addr: u64,
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: u64) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
        }
    }

    pub fn contains(&self, addr: u64, len: u64) -> bool {
        let Some(end) = self.base_addr.checked_add(self.data.len() as u64) else {
            return false;
        };
        addr >= self.base_addr && addr.checked_add(len).map_or(false, |last| last <= end)
    }

    pub fn read_u8(&self, addr: u64) -> Option<u8> {
        if self.contains(addr, 1) {
            Some(self.data[(addr - self.base_addr) as usize])
        } else {
            None
        }
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> bool {
        if self.contains(addr, 1) {
            self.data[(addr - self.base_addr) as usize] = value;
            true
        } else {
            false
        }
    }

    /// Little-endian 8-byte load; `None` unless the whole word is mapped.
    pub fn read_u64(&self, addr: u64) -> Option<u64> {
        if !self.contains(addr, 8) {
            return None;
        }
        let offset = (addr - self.base_addr) as usize;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[offset..offset + 8]);
        Some(u64::from_le_bytes(bytes))
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) -> bool {
        if !self.contains(addr, 8) {
            return false;
        }
        let offset = (addr - self.base_addr) as usize;
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        true
    }
}
