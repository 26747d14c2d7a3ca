//! Adapters presenting the simulated bus to the diagnostic as its three
//! hardware capabilities.
//!
//! The routine holds the transmit register, host-signal register and scratch
//! region at the same time, so they share the bus through a `RefCell`.
//! Accesses that fault are logged and collected; the routine itself never
//! sees an error.

use crate::bus::SystemBus;
use crate::{Bus, SimulationError, SimulationObserver};
use cacheprobe_diag::{Cells, Signal, Transmit};
use std::cell::RefCell;
use std::sync::Arc;

const CELL_BYTES: u64 = 8;

pub struct SharedBus<'a> {
    bus: RefCell<&'a mut SystemBus>,
    observers: &'a [Arc<dyn SimulationObserver>],
    violations: RefCell<Vec<SimulationError>>,
}

impl<'a> SharedBus<'a> {
    pub fn new(bus: &'a mut SystemBus, observers: &'a [Arc<dyn SimulationObserver>]) -> Self {
        Self {
            bus: RefCell::new(bus),
            observers,
            violations: RefCell::new(Vec::new()),
        }
    }

    fn record(&self, err: SimulationError) {
        tracing::warn!("{}", err);
        self.violations.borrow_mut().push(err);
    }

    /// Faulting loads read as zero.
    pub fn load_u64(&self, addr: u64) -> u64 {
        let value = match self.bus.borrow().read_u64(addr) {
            Ok(v) => v,
            Err(e) => {
                self.record(e);
                0
            }
        };
        tracing::debug!("LOAD  [{:#x}] -> {}", addr, value);
        for observer in self.observers {
            observer.on_load(addr, value);
        }
        value
    }

    pub fn store_u64(&self, addr: u64, value: u64) {
        tracing::debug!("STORE [{:#x}] <- {}", addr, value);
        for observer in self.observers {
            observer.on_store(addr, value);
        }
        self.poke_u64(addr, value);
    }

    /// Store that observers do not see, used for fault injection.
    pub fn poke_u64(&self, addr: u64, value: u64) {
        let res = self.bus.borrow_mut().write_u64(addr, value);
        if let Err(e) = res {
            self.record(e);
        }
    }

    pub fn transmit(&self, addr: u64, byte: u8) {
        for observer in self.observers {
            observer.on_transmit(byte);
        }
        let res = self.bus.borrow_mut().write_u8(addr, byte);
        if let Err(e) = res {
            self.record(e);
        }
    }

    pub fn signal(&self, addr: u64, code: u64) {
        for observer in self.observers {
            observer.on_signal(code);
        }
        let res = self.bus.borrow_mut().write_u64(addr, code);
        if let Err(e) = res {
            self.record(e);
        }
    }

    pub fn take_violations(&self) -> Vec<SimulationError> {
        std::mem::take(&mut *self.violations.borrow_mut())
    }
}

/// UART transmit register.
pub struct TxPort<'s, 'a> {
    bus: &'s SharedBus<'a>,
    addr: u64,
}

impl<'s, 'a> TxPort<'s, 'a> {
    pub fn new(bus: &'s SharedBus<'a>, addr: u64) -> Self {
        Self { bus, addr }
    }
}

impl Transmit for TxPort<'_, '_> {
    fn transmit(&mut self, byte: u8) {
        self.bus.transmit(self.addr, byte);
    }
}

/// Host-signal register.
pub struct SignalPort<'s, 'a> {
    bus: &'s SharedBus<'a>,
    addr: u64,
}

impl<'s, 'a> SignalPort<'s, 'a> {
    pub fn new(bus: &'s SharedBus<'a>, addr: u64) -> Self {
        Self { bus, addr }
    }
}

impl Signal for SignalPort<'_, '_> {
    fn signal(&mut self, code: u64) {
        self.bus.signal(self.addr, code);
    }
}

/// Scratch region, cell `n` at `base + 8 * n`.
pub struct ScratchPort<'s, 'a> {
    bus: &'s SharedBus<'a>,
    base: u64,
}

impl<'s, 'a> ScratchPort<'s, 'a> {
    pub fn new(bus: &'s SharedBus<'a>, base: u64) -> Self {
        Self { bus, base }
    }

    fn addr(&self, offset: usize) -> u64 {
        self.base.wrapping_add((offset as u64).wrapping_mul(CELL_BYTES))
    }
}

impl Cells for ScratchPort<'_, '_> {
    fn load(&mut self, offset: usize) -> u64 {
        self.bus.load_u64(self.addr(offset))
    }

    fn store(&mut self, offset: usize, value: u64) {
        self.bus.store_u64(self.addr(offset), value);
    }
}
