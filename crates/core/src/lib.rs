pub mod bus;
pub mod memory;
pub mod metrics;
pub mod peripherals;
pub mod ports;

use std::any::Any;
use std::sync::Arc;

use cacheprobe_config::{BoardDescriptor, CellFault};
use cacheprobe_diag::{pattern, Console, Geometry, Grid, Verdict};

use crate::ports::{ScratchPort, SharedBus, SignalPort, TxPort};


#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Fault at set {set} line {line} lies outside the grid")]
    FaultOutsideGrid { set: usize, line: usize },
    #[error("Grid of {sets} sets x {lines} lines overflows the address space")]
    GridOverflow { lines: usize, sets: usize },
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait for observing diagnostic accesses in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_run_start(&self, _grid: Grid) {}
    fn on_run_stop(&self, _verdict: Verdict) {}
    fn on_store(&self, _addr: u64, _value: u64) {}
    fn on_load(&self, _addr: u64, _value: u64) {}
    fn on_transmit(&self, _byte: u8) {}
    fn on_signal(&self, _code: u64) {}
}

/// Trait representing a memory-mapped peripheral
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u64) -> SimResult<u8>;
    fn write(&mut self, offset: u64, value: u8) -> SimResult<()>;

    fn write_u64(&mut self, offset: u64, value: u64) -> SimResult<()> {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.write(offset + i as u64, byte)?;
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

/// Trait representing the system bus
pub trait Bus {
    fn read_u8(&self, addr: u64) -> SimResult<u8>;
    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()>;

    fn read_u64(&self, addr: u64) -> SimResult<u64> {
        let mut bytes = [0u8; 8];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_u8(addr + i as u64)?;
        }
        // Little Endian
        Ok(u64::from_le_bytes(bytes))
    }

    fn write_u64(&mut self, addr: u64, value: u64) -> SimResult<()> {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.write_u8(addr + i as u64, byte)?;
        }
        Ok(())
    }
}

/// What the host can observe after one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub grid: Grid,
    /// Verdict the routine computed.
    pub verdict: Verdict,
    /// Word latched in the host-signal register, if it was written.
    pub host_signal: Option<u64>,
    pub signal_writes: u32,
    pub transcript: Vec<u8>,
    /// Bus faults hit while running. The run itself always completes.
    pub violations: Vec<SimulationError>,
}

impl RunReport {
    pub fn transcript_text(&self) -> String {
        String::from_utf8_lossy(&self.transcript).into_owned()
    }

    /// One diagnostic line is printed per mismatching cell.
    pub fn mismatches(&self) -> usize {
        self.transcript.windows(2).filter(|w| w == b"\r\n").count()
    }

    /// Verdict as the host sees it through the signal register.
    pub fn host_verdict(&self) -> Option<Verdict> {
        self.host_signal.and_then(Verdict::from_code)
    }
}

/// Simulated board running the diagnostic.
pub struct Machine {
    pub bus: bus::SystemBus,
    pub board: BoardDescriptor,
    pub observers: Vec<Arc<dyn SimulationObserver>>,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            bus: bus::SystemBus::new(),
            board: BoardDescriptor::default(),
            observers: Vec::new(),
        }
    }

    pub fn from_config(board: &BoardDescriptor) -> anyhow::Result<Self> {
        Ok(Self {
            bus: bus::SystemBus::from_config(board)?,
            board: board.clone(),
            observers: Vec::new(),
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.board.geometry()
    }

    /// Byte address of grid cell `(set, line)`.
    pub fn cell_addr(&self, set: usize, line: usize) -> u64 {
        let offset = self.geometry().offset(set, line) as u64;
        self.board.scratch.base.wrapping_add(offset.wrapping_mul(8))
    }

    pub fn reset(&mut self) {
        self.bus.reset_peripherals();
    }

    /// Writes the pattern, applies `faults`, verifies and signals the host.
    ///
    /// Peripherals are reset first; scratch memory is not.
    pub fn run(&mut self, grid: Grid, faults: &[CellFault]) -> SimResult<RunReport> {
        if self.board.grid_bytes(grid).is_none() {
            return Err(SimulationError::GridOverflow {
                lines: grid.lines,
                sets: grid.sets,
            });
        }
        if let Some(f) = faults.iter().find(|f| !grid.contains(f.set, f.line)) {
            return Err(SimulationError::FaultOutsideGrid {
                set: f.set,
                line: f.line,
            });
        }

        self.reset();
        for observer in &self.observers {
            observer.on_run_start(grid);
        }

        let geometry = self.geometry();
        let shared = SharedBus::new(&mut self.bus, &self.observers);
        let mut cells = ScratchPort::new(&shared, self.board.scratch.base);
        let mut console = Console::new(TxPort::new(&shared, self.board.uart_tx));
        let mut host = SignalPort::new(&shared, self.board.host_signal);

        tracing::info!("Writing pattern over {} sets x {} lines", grid.sets, grid.lines);
        pattern::write(&mut cells, &geometry, grid);

        for fault in faults {
            let offset = geometry.offset(fault.set, fault.line) as u64;
            let addr = self.board.scratch.base + offset * 8;
            tracing::info!(
                "Injecting {} at set {} line {} ({:#x})",
                fault.value,
                fault.set,
                fault.line,
                addr
            );
            shared.poke_u64(addr, fault.value);
        }

        tracing::info!("Verifying pattern");
        let verdict = pattern::verify(&mut cells, &mut console, &mut host, &geometry, grid);
        let violations = shared.take_violations();

        for observer in &self.observers {
            observer.on_run_stop(verdict);
        }

        let host_signal = self.bus.host_signal();
        let report = RunReport {
            grid,
            verdict,
            host_signal: host_signal.and_then(|h| h.value()),
            signal_writes: host_signal.map_or(0, |h| h.writes()),
            transcript: self
                .bus
                .uart()
                .map(|u| u.transmitted().to_vec())
                .unwrap_or_default(),
            violations,
        };
        tracing::info!(
            "Run finished: {:?}, {} mismatch line(s), {} bus violation(s)",
            report.verdict,
            report.mismatches(),
            report.violations.len()
        );
        Ok(report)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
