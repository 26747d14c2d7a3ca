// CacheProbe - Cache Pattern Diagnostic
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Memory map of the reference board the diagnostic is built for.

use crate::layout::{Geometry, Grid};

/// UART transmit holding register, one byte per write.
pub const UART_TX: usize = 0x0010_0000;
/// Host-observed result word.
pub const HOST_SIGNAL: usize = 0x0000_1000;
/// First cell of the scratch region under test.
pub const SCRATCH_BASE: usize = 0x0001_0000;
/// Bytes of scratch behind `SCRATCH_BASE`.
pub const SCRATCH_SIZE: usize = 64 * 1024;

/// 4 cells (32 bytes) per line, 64 sets.
pub const GEOMETRY: Geometry = Geometry::new(4, 64);

/// Dimensions used by the reset entry point.
pub const GRID: Grid = Grid::new(10, 10);
