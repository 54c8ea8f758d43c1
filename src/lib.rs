//! crab-ahci - polled AHCI driver for bare-metal environments
//!
//! This library finds a SATA host bus adapter running in AHCI mode, brings its
//! ports up one at a time, issues ATA commands synchronously and builds an
//! inventory of the attached drives from their IDENTIFY data.
//!
//! Everything the driver needs from its environment is reached through small
//! traits so the same code runs under firmware, a DOS-style extender or a
//! hosted test harness:
//!
//! - [`drivers::pci::PciAccess`] for configuration space
//! - [`drivers::mmio::PhysMapper`] for mapping the register BAR
//! - [`drivers::dma::DmaMemory`] for DMA-visible buffers
//! - [`time::Clock`] for the monotonic time base used by every wait

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod arch;
pub mod drivers;
#[cfg(feature = "serial-log")]
pub mod logger;
pub mod time;

pub use drivers::ahci::{
    AhciController, AhciError, AhciPort, AhciSession, AtaCommand, DeviceType, Direction,
    DriveInfo, DriveList, PortState, TaskFileRegisters, Timeouts,
};
