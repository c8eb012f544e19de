//! Intel 82540EM (e1000) descriptor-ring driver.
//!
//! Talks to the controller through its memory-mapped registers, owns the
//! transmit and receive descriptor rings, and hands completed frames upward
//! through a [`FrameSink`]. Device discovery (PCI) and interrupt routing
//! belong to the embedding kernel; this crate starts where the register
//! window's base address has already been obtained.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod regs;
pub mod ring;

pub use regs::{DeviceRegs, Mmio};
pub use ring::{E1000, FrameSink, TxFull, N_RX, N_TX};
