// CacheProbe - Cache Pattern Diagnostic
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::console::Console;
use crate::layout::{pattern_value, Geometry, Grid};
use crate::reg::{Cells, Signal, Transmit};

/// Outcome of one verification pass, as written to the host-signal register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub const PASS_CODE: u64 = 0x1;
    pub const FAIL_CODE: u64 = 0xFF;

    pub const fn code(self) -> u64 {
        match self {
            Verdict::Pass => Self::PASS_CODE,
            Verdict::Fail => Self::FAIL_CODE,
        }
    }

    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            Self::PASS_CODE => Some(Verdict::Pass),
            Self::FAIL_CODE => Some(Verdict::Fail),
            _ => None,
        }
    }
}

/// Fills every cell of `grid` with its pattern value, sets outer, lines inner.
pub fn write<C: Cells>(cells: &mut C, geometry: &Geometry, grid: Grid) {
    for (set, line) in grid.cells() {
        cells.store(geometry.offset(set, line), pattern_value(set, line));
    }
}

/// Re-reads `grid` in the order [`write`] filled it, prints one line per
/// mismatching cell and finally writes the verdict to `host`, exactly once.
pub fn verify<C, T, S>(
    cells: &mut C,
    console: &mut Console<T>,
    host: &mut S,
    geometry: &Geometry,
    grid: Grid,
) -> Verdict
where
    C: Cells,
    T: Transmit,
    S: Signal,
{
    let mut failed = false;

    for (set, line) in grid.cells() {
        let observed = cells.load(geometry.offset(set, line));
        if observed != pattern_value(set, line) {
            report_mismatch(console, observed, set, line);
            failed = true;
        }
    }

    let verdict = if failed { Verdict::Fail } else { Verdict::Pass };
    host.signal(verdict.code());
    verdict
}

// "<observed> = <set+1> * <line+1>\r\n"
fn report_mismatch<T: Transmit>(console: &mut Console<T>, observed: u64, set: usize, line: usize) {
    console.print_number(observed);
    console.puts(" = ");
    console.print_number(set as u64 + 1);
    console.puts(" * ");
    console.print_number(line as u64 + 1);
    console.puts("\r\n");
}
