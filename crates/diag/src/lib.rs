// CacheProbe - Cache Pattern Diagnostic
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Write/verify pattern diagnostic for a set-associative memory path.
//!
//! The routine fills a grid of scratch cells with `(set + 1) * (line + 1)`,
//! reads it back, prints `<observed> = <set+1> * <line+1>` for every cell that
//! came back wrong, and writes a single pass/fail word for the host.
//! All hardware access goes through the [`Transmit`], [`Signal`] and [`Cells`]
//! traits so the same code runs on the target and inside the host simulator.

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod console;
pub mod layout;
pub mod pattern;
pub mod reg;

pub use console::Console;
pub use layout::{pattern_value, Geometry, Grid};
pub use pattern::Verdict;
pub use reg::{Cells, Reg, Region, Signal, Transmit};

/// Writes the pattern over `grid`, then verifies it and signals the host.
pub fn run<C, T, S>(
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
    pattern::write(cells, geometry, grid);
    pattern::verify(cells, console, host, geometry, grid)
}
