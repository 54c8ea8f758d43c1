//! Drive inventory
//!
//! Walks the implemented ports, brings each SATA port up just long enough to
//! IDENTIFY the drive, and collects what it reports.

use heapless::{String, Vec};

use super::controller::AhciController;
use super::identify::{IdentifyData, capacity_gib};
use super::port::AhciPort;
use super::regs::{MAX_PORTS, SECTOR_SIZE};
use super::{AhciError, DeviceType};
use crate::drivers::dma::{DmaBuffer, DmaMemory};
use crate::drivers::mmio::RegisterIo;
use crate::time::Clock;

/// Upper bound on drives in one scan, one per port
pub const MAX_DRIVES: usize = MAX_PORTS as usize;

pub type DriveList = Vec<DriveInfo, MAX_DRIVES>;

/// One SATA drive as reported by IDENTIFY DEVICE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveInfo {
    /// Port the drive is attached to
    pub port: u8,
    pub total_sectors: u64,
    pub bytes_per_sector: u32,
    /// Capacity in GiB, rounded up
    pub capacity_gib: u64,
    pub model: String<40>,
    pub serial: String<20>,
    pub firmware: String<8>,
}

impl DriveInfo {
    fn from_identify(port: u8, id: &IdentifyData) -> Self {
        let total_sectors = id.total_sectors();
        Self {
            port,
            total_sectors,
            bytes_per_sector: SECTOR_SIZE,
            capacity_gib: capacity_gib(total_sectors),
            model: id.model(),
            serial: id.serial(),
            firmware: id.firmware(),
        }
    }
}

impl core::fmt::Display for DriveInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "port {}: {} (serial {}, firmware {}), {} sectors, {} GiB",
            self.port,
            self.model,
            self.serial,
            self.firmware,
            self.total_sectors,
            self.capacity_gib
        )
    }
}

/// IDENTIFY every SATA drive behind `controller`
///
/// A port that fails any step is logged and skipped.
pub fn scan<R, C, D>(controller: &AhciController<R, C>, dma: &mut D) -> DriveList
where
    R: RegisterIo,
    C: Clock,
    D: DmaMemory,
{
    let mut drives = DriveList::new();

    for port in 0..MAX_PORTS {
        if !controller.port_implemented(port) {
            continue;
        }

        match controller.classify(port) {
            DeviceType::Sata => {}
            DeviceType::Unknown => {
                log::debug!("AHCI Port {}: no device", port);
                continue;
            }
            other => {
                log::info!("AHCI Port {}: skipping {:?} device", port, other);
                continue;
            }
        }

        let Some(mut buffer) = dma.allocate(SECTOR_SIZE as usize, SECTOR_SIZE as usize) else {
            log::warn!("AHCI Port {}: {}", port, AhciError::AllocationFailure);
            continue;
        };

        match identify_port(controller, &mut *dma, port, &mut buffer) {
            Ok(info) => {
                log::info!("AHCI: {}", info);
                if drives.push(info).is_err() {
                    dma.release(buffer);
                    break;
                }
            }
            Err(e) => log::warn!("AHCI Port {}: skipped: {}", port, e),
        }

        dma.release(buffer);
    }

    log::info!("AHCI: found {} SATA drive(s)", drives.len());
    drives
}

fn identify_port<R, C, D>(
    controller: &AhciController<R, C>,
    dma: &mut D,
    number: u8,
    buffer: &mut DmaBuffer,
) -> Result<DriveInfo, AhciError>
where
    R: RegisterIo,
    C: Clock,
    D: DmaMemory,
{
    let mut port = AhciPort::allocate(controller, dma, number)?;
    port.reset()?;
    port.setup()?;
    buffer.clear();
    port.identify(buffer)?;
    port.stop();
    port.free();

    let id = IdentifyData::parse(buffer.as_slice()).ok_or(AhciError::UnsupportedDevice)?;
    Ok(DriveInfo::from_identify(number, &id))
}
