// CacheProbe - Cache Pattern Diagnostic
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Volatile access to memory-mapped registers and the scratch region.
//!
//! The diagnostic never dereferences a raw address directly. Every register
//! it touches is a small capability object whose accessors compile to exactly
//! one volatile load or store per call.

/// Sink for diagnostic text, one byte per call.
pub trait Transmit {
    fn transmit(&mut self, byte: u8);
}

/// Sink for the final pass/fail word observed by the host.
pub trait Signal {
    fn signal(&mut self, code: u64);
}

/// Word-addressed scratch storage under test. `offset` is counted in cells.
pub trait Cells {
    fn load(&mut self, offset: usize) -> u64;
    fn store(&mut self, offset: usize, value: u64);
}

/// A single memory-mapped register of width `T`.
#[derive(Debug)]
pub struct Reg<T: Copy> {
    ptr: *mut T,
}

impl<T: Copy> Reg<T> {
    /// # Safety
    /// `addr` must be a valid, suitably aligned register address for the
    /// whole lifetime of the returned value.
    pub const unsafe fn new(addr: usize) -> Self {
        Self {
            ptr: addr as *mut T,
        }
    }

    /// # Safety
    /// Same contract as [`Reg::new`].
    pub const unsafe fn from_ptr(ptr: *mut T) -> Self {
        Self { ptr }
    }

    pub fn read(&self) -> T {
        unsafe { self.ptr.read_volatile() }
    }

    pub fn write(&mut self, value: T) {
        unsafe { self.ptr.write_volatile(value) }
    }
}

impl Transmit for Reg<u8> {
    fn transmit(&mut self, byte: u8) {
        self.write(byte);
    }
}

impl Signal for Reg<u64> {
    fn signal(&mut self, code: u64) {
        self.write(code);
    }
}

/// Base of the 64-bit scratch cells.
#[derive(Debug)]
pub struct Region {
    base: *mut u64,
}

impl Region {
    /// # Safety
    /// Every cell the caller later loads or stores through this region must
    /// be valid, 8-byte aligned memory.
    pub const unsafe fn new(addr: usize) -> Self {
        Self {
            base: addr as *mut u64,
        }
    }

    /// # Safety
    /// Same contract as [`Region::new`].
    pub const unsafe fn from_ptr(base: *mut u64) -> Self {
        Self { base }
    }
}

impl Cells for Region {
    fn load(&mut self, offset: usize) -> u64 {
        unsafe { self.base.add(offset).read_volatile() }
    }

    fn store(&mut self, offset: usize, value: u64) {
        unsafe { self.base.add(offset).write_volatile(value) }
    }
}
