// CacheProbe - Cache Pattern Diagnostic
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#![no_std]
#![no_main]
#![allow(clippy::empty_loop)]

use cacheprobe_diag::{board, Console, Reg, Region};
use panic_halt as _;
use riscv_rt::entry;

#[entry]
fn main() -> ! {
    // Single linear pass, nothing may preempt it.
    unsafe {
        riscv::interrupt::disable();
    }

    let mut cells = unsafe { Region::new(board::SCRATCH_BASE) };
    let mut console = Console::new(unsafe { Reg::<u8>::new(board::UART_TX) });
    let mut host = unsafe { Reg::<u64>::new(board::HOST_SIGNAL) };

    cacheprobe_diag::run(
        &mut cells,
        &mut console,
        &mut host,
        &board::GEOMETRY,
        board::GRID,
    );

    loop {}
}
