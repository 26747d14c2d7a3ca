// CacheProbe - Cache Pattern Diagnostic
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Mapping from grid coordinates to scratch cells.
//!
//! Consecutive lines of one set are `line_stride` cells apart and whole sets
//! are `line_stride * set_count` cells apart, so that neighbouring lines
//! land in different structural positions of a set-associative store placed
//! in front of the scratch memory.

/// Structural constants of the memory behind the scratch region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Cells per line.
    pub line_stride: usize,
    /// Sets in the structure being exercised.
    pub set_count: usize,
}

impl Geometry {
    pub const fn new(line_stride: usize, set_count: usize) -> Self {
        Self {
            line_stride,
            set_count,
        }
    }

    /// Cell offset of `(set, line)` from the region base.
    pub const fn offset(&self, set: usize, line: usize) -> usize {
        set * (self.line_stride * self.set_count) + line * self.line_stride
    }

    /// Number of cells from the base that a full pass over `grid` touches,
    /// or `None` if that does not fit in `usize`.
    pub fn span(&self, grid: Grid) -> Option<usize> {
        if grid.is_empty() {
            return Some(0);
        }
        let set_stride = self.line_stride.checked_mul(self.set_count)?;
        let last_set = (grid.sets - 1).checked_mul(set_stride)?;
        let last_line = (grid.lines - 1).checked_mul(self.line_stride)?;
        last_set.checked_add(last_line)?.checked_add(1)
    }
}

/// Dimensions of one pass: `lines` is the inner index, `sets` the outer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub lines: usize,
    pub sets: usize,
}

impl Grid {
    pub const fn new(lines: usize, sets: usize) -> Self {
        Self { lines, sets }
    }

    pub const fn len(&self) -> usize {
        self.lines * self.sets
    }

    pub const fn is_empty(&self) -> bool {
        self.lines == 0 || self.sets == 0
    }

    pub const fn contains(&self, set: usize, line: usize) -> bool {
        set < self.sets && line < self.lines
    }

    /// `(set, line)` pairs in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> {
        let lines = self.lines;
        (0..self.sets).flat_map(move |set| (0..lines).map(move |line| (set, line)))
    }
}

/// The value stored at, and expected back from, `(set, line)`.
pub const fn pattern_value(set: usize, line: usize) -> u64 {
    (set as u64 + 1) * (line as u64 + 1)
}
