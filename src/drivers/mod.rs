//! Hardware drivers
//!
//! The AHCI driver and the platform pieces it stands on: PCI configuration
//! access, MMIO register windows, DMA buffers and the debug UART.

pub mod ahci;
pub mod dma;
pub mod mmio;
pub mod pci;
#[cfg(feature = "serial-log")]
pub mod serial;
