//! AHCI (Advanced Host Controller Interface) driver
//!
//! Polled, single-command driver for SATA host bus adapters. The layers are:
//!
//! - [`AhciController`]: global HBA state (AHCI mode, reset, restoration)
//! - [`AhciPort`]: one port's lifecycle and its DMA structures
//! - [`command`]: the synchronous command engine with error recovery
//! - [`inventory`]: IDENTIFY every SATA drive and collect [`DriveInfo`]
//! - [`AhciSession`]: PCI discovery, BAR mapping and teardown

pub mod command;
pub mod controller;
pub mod hba;
pub mod identify;
pub mod inventory;
pub mod port;
pub mod regs;
#[cfg(test)]
pub(crate) mod sim;

pub use command::{AtaCommand, Direction, TaskFileRegisters};
pub use controller::AhciController;
pub use inventory::{DriveInfo, DriveList};
pub use port::{AhciPort, PortState};

use crate::drivers::dma::DmaMemory;
use crate::drivers::mmio::{MmioRegion, PhysMapper};
use crate::drivers::pci::{self, PciAccess, PciAddress, PciFunction};
use crate::time::Clock;

use regs::HBA_MMIO_SIZE;

/// AHCI error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AhciError {
    /// GHC.AE did not take the requested value
    ControllerEnableTimeout,
    /// GHC.HR did not self-clear
    ControllerResetTimeout,
    /// Port command engine did not stop
    PortQuiesceTimeout,
    /// No PHY communication on the port
    LinkTrainingTimeout,
    /// Device kept BSY or DRQ set
    DeviceNotReadyTimeout,
    /// Command never signalled completion
    CommandTimeout,
    /// Command completed with an error status
    TaskFileError { status: u8, error: u8 },
    /// DMA memory could not be reserved
    AllocationFailure,
    /// Device on the port is not a SATA disk
    UnsupportedDevice,
    /// No PCI function with the AHCI class code
    NoController,
    /// PCI function is not an AHCI storage controller
    NotAhciController,
    /// BAR5 was never assigned
    BarNotInitialized,
    /// BAR5 could not be mapped
    MappingFailure,
    /// Port number outside 0-31
    InvalidPort,
    /// Port is not set up for commands
    PortNotReady,
    /// Data buffer missing or shorter than the transfer
    BufferTooSmall,
    /// Transfer longer than one PRD entry can describe
    TransferTooLarge,
}

impl core::fmt::Display for AhciError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ControllerEnableTimeout => write!(f, "AHCI mode could not be changed"),
            Self::ControllerResetTimeout => write!(f, "HBA reset did not complete"),
            Self::PortQuiesceTimeout => write!(f, "port command engine did not stop"),
            Self::LinkTrainingTimeout => write!(f, "no link on port"),
            Self::DeviceNotReadyTimeout => write!(f, "device not ready"),
            Self::CommandTimeout => write!(f, "command timed out"),
            Self::TaskFileError { status, error } => {
                write!(f, "command failed: status={:#04x} error={:#04x}", status, error)
            }
            Self::AllocationFailure => write!(f, "DMA allocation failed"),
            Self::UnsupportedDevice => write!(f, "unsupported device"),
            Self::NoController => write!(f, "no AHCI controller found"),
            Self::NotAhciController => write!(f, "PCI function is not an AHCI controller"),
            Self::BarNotInitialized => write!(f, "BAR5 not initialized"),
            Self::MappingFailure => write!(f, "cannot map HBA registers"),
            Self::InvalidPort => write!(f, "invalid port number"),
            Self::PortNotReady => write!(f, "port not ready"),
            Self::BufferTooSmall => write!(f, "buffer too small for transfer"),
            Self::TransferTooLarge => write!(f, "transfer exceeds 4 MiB"),
        }
    }
}

/// Device type detected on port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Sata,
    Atapi,
    EnclosureBridge,
    PortMultiplier,
    Unknown,
}

impl DeviceType {
    /// Classify a port signature
    pub fn from_signature(signature: u32) -> Self {
        match signature {
            regs::SATA_SIG_ATA => Self::Sata,
            regs::SATA_SIG_ATAPI => Self::Atapi,
            regs::SATA_SIG_SEMB => Self::EnclosureBridge,
            regs::SATA_SIG_PM => Self::PortMultiplier,
            _ => Self::Unknown,
        }
    }
}

/// Wait budgets, all in milliseconds unless noted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Writes of GHC.AE before giving up (count)
    pub enable_attempts: u32,
    /// Delay between GHC.AE writes
    pub enable_retry_ms: u64,
    /// GHC.HR self-clear budget
    pub controller_reset_ms: u64,
    /// Attempts to stop a port's engine (count)
    pub port_stop_attempts: u32,
    /// Delay between port stop attempts
    pub port_stop_interval_ms: u64,
    /// Settle time after setting PxCMD.SUD
    pub spin_up_ms: u64,
    /// PxSSTS.DET == 3 budget
    pub link_training_ms: u64,
    /// BSY/DRQ clear budget
    pub device_ready_ms: u64,
    /// Interval between link and ready polls
    pub poll_interval_ms: u64,
    /// Command completion budget
    pub command_ms: u64,
    /// PxCMD.CR drop budget during error recovery
    pub recovery_ms: u64,
    /// Width of the COMRESET pulse
    pub comreset_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            enable_attempts: 5,
            enable_retry_ms: 10,
            controller_reset_ms: 1000,
            port_stop_attempts: 4,
            port_stop_interval_ms: 500,
            spin_up_ms: 1000,
            link_training_ms: 20_000,
            device_ready_ms: 20_000,
            poll_interval_ms: 100,
            command_ms: 20_000,
            recovery_ms: 10_000,
            comreset_ms: 1,
        }
    }
}

/// A discovered, mapped and initialized AHCI controller
///
/// Dropping the session without [`AhciSession::close`] leaves the controller
/// in AHCI mode and the BAR mapped.
pub struct AhciSession<M: PhysMapper, C: Clock> {
    controller: AhciController<MmioRegion, C>,
    mapper: M,
    function: PciFunction,
    bar5: u32,
    mapped_base: u64,
}

impl<M: PhysMapper, C: Clock> AhciSession<M, C> {
    /// Find the first AHCI function on the bus and bring it up
    pub fn detect<A: PciAccess + ?Sized>(
        pci: &A,
        mapper: M,
        clock: C,
        timeouts: Timeouts,
    ) -> Result<Self, AhciError> {
        let Some(function) = pci::find_by_class(
            pci,
            pci::CLASS_STORAGE,
            pci::SUBCLASS_SATA,
            pci::PROG_IF_AHCI,
        ) else {
            log::error!("AHCI: no controller found");
            return Err(AhciError::NoController);
        };
        Self::detect_at(pci, function.address, mapper, clock, timeouts)
    }

    /// Bring up the AHCI function at `address`
    pub fn detect_at<A: PciAccess + ?Sized>(
        pci: &A,
        address: PciAddress,
        mut mapper: M,
        clock: C,
        timeouts: Timeouts,
    ) -> Result<Self, AhciError> {
        let function = PciFunction::read(pci, address).ok_or(AhciError::NoController)?;
        log::info!(
            "AHCI: controller at {}: {:04x}:{:04x} class={:02x}:{:02x}:{:02x}",
            address,
            function.vendor_id,
            function.device_id,
            function.class_code,
            function.subclass,
            function.prog_if
        );

        if !function.is_ahci() {
            log::error!("AHCI: {} is not an AHCI storage controller", address);
            return Err(AhciError::NotAhciController);
        }

        let bar5 = pci::read_bar(pci, address, 5) & !7;
        if bar5 == 0 {
            log::error!("AHCI: BAR5 not initialized by firmware");
            return Err(AhciError::BarNotInitialized);
        }

        pci::enable_memory_and_bus_master(pci, address);

        let mapped_base = mapper
            .map(bar5 as u64, HBA_MMIO_SIZE)
            .ok_or(AhciError::MappingFailure)?;
        log::debug!("AHCI: ABAR {:#x} mapped at {:#x}", bar5, mapped_base);

        // SAFETY: the mapper just returned a live mapping of the register page
        let Some(region) = (unsafe { MmioRegion::new(mapped_base, HBA_MMIO_SIZE) }) else {
            mapper.unmap(mapped_base, HBA_MMIO_SIZE);
            return Err(AhciError::MappingFailure);
        };

        let controller = match AhciController::new(region, clock, timeouts) {
            Ok(controller) => controller,
            Err(e) => {
                log::error!("AHCI: controller initialization failed: {}", e);
                mapper.unmap(mapped_base, HBA_MMIO_SIZE);
                return Err(e);
            }
        };

        Ok(Self {
            controller,
            mapper,
            function,
            bar5,
            mapped_base,
        })
    }

    pub fn controller(&self) -> &AhciController<MmioRegion, C> {
        &self.controller
    }

    pub fn function(&self) -> &PciFunction {
        &self.function
    }

    /// Physical register base from BAR5
    pub fn abar(&self) -> u32 {
        self.bar5
    }

    /// Enumerate SATA drives on every implemented port
    pub fn scan<D: DmaMemory>(&self, dma: &mut D) -> DriveList {
        inventory::scan(&self.controller, dma)
    }

    /// Restore the controller's entry state and release the mapping
    pub fn close(self) {
        let Self {
            controller,
            mut mapper,
            mapped_base,
            ..
        } = self;
        controller.shutdown();
        mapper.unmap(mapped_base, HBA_MMIO_SIZE);
        log::debug!("AHCI: session closed");
    }
}
