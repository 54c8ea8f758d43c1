//! PCI configuration space access
//!
//! Discovery only needs the first 256 bytes of a function's configuration
//! space, so the legacy I/O mechanism on ports 0xCF8/0xCFC is sufficient.
//! Other environments (an extender's BIOS services, a hypervisor) plug in
//! their own [`PciAccess`].

use super::PciAddress;

/// Trait for PCI configuration space access
///
/// Only the dword accessors are required; narrower accesses are derived from
/// them with read-modify-write on the containing dword.
pub trait PciAccess {
    /// Read a 32-bit value from PCI configuration space
    fn read32(&self, addr: PciAddress, offset: u8) -> u32;

    /// Write a 32-bit value to PCI configuration space
    fn write32(&self, addr: PciAddress, offset: u8, value: u32);

    /// Read a 16-bit value from PCI configuration space
    fn read16(&self, addr: PciAddress, offset: u8) -> u16 {
        let shift = (offset & 0x02) * 8;
        let value = self.read32(addr, offset & !0x3);
        ((value >> shift) & 0xFFFF) as u16
    }

    /// Write a 16-bit value to PCI configuration space
    fn write16(&self, addr: PciAddress, offset: u8, value: u16) {
        let aligned_offset = offset & !0x3;
        let shift = (offset & 0x02) * 8;
        let current = self.read32(addr, aligned_offset);
        let mask = !(0xFFFF_u32 << shift);
        self.write32(addr, aligned_offset, (current & mask) | ((value as u32) << shift));
    }

    /// Read an 8-bit value from PCI configuration space
    fn read8(&self, addr: PciAddress, offset: u8) -> u8 {
        let shift = (offset & 0x03) * 8;
        let value = self.read32(addr, offset & !0x3);
        ((value >> shift) & 0xFF) as u8
    }

    /// Write an 8-bit value to PCI configuration space
    fn write8(&self, addr: PciAddress, offset: u8, value: u8) {
        let aligned_offset = offset & !0x3;
        let shift = (offset & 0x03) * 8;
        let current = self.read32(addr, aligned_offset);
        let mask = !(0xFF_u32 << shift);
        self.write32(addr, aligned_offset, (current & mask) | ((value as u32) << shift));
    }
}

impl<A: PciAccess + ?Sized> PciAccess for &A {
    fn read32(&self, addr: PciAddress, offset: u8) -> u32 {
        (**self).read32(addr, offset)
    }

    fn write32(&self, addr: PciAddress, offset: u8, value: u32) {
        (**self).write32(addr, offset, value)
    }
}

/// PCI configuration space ports (legacy CAM)
#[cfg(target_arch = "x86_64")]
const PCI_CONFIG_ADDRESS: u16 = 0xCF8;
#[cfg(target_arch = "x86_64")]
const PCI_CONFIG_DATA: u16 = 0xCFC;

/// Legacy I/O port-based PCI Configuration Access Mechanism
#[derive(Debug, Default, Clone, Copy)]
pub struct IoCamAccess;

impl PciAccess for IoCamAccess {
    #[cfg(target_arch = "x86_64")]
    fn read32(&self, addr: PciAddress, offset: u8) -> u32 {
        use x86_64::instructions::port::{Port, PortWriteOnly};

        let mut address_port: PortWriteOnly<u32> = PortWriteOnly::new(PCI_CONFIG_ADDRESS);
        let mut data_port: Port<u32> = Port::new(PCI_CONFIG_DATA);

        unsafe {
            address_port.write(addr.cam_address(offset));
            data_port.read()
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn read32(&self, _addr: PciAddress, _offset: u8) -> u32 {
        0xFFFFFFFF
    }

    #[cfg(target_arch = "x86_64")]
    fn write32(&self, addr: PciAddress, offset: u8, value: u32) {
        use x86_64::instructions::port::{Port, PortWriteOnly};

        let mut address_port: PortWriteOnly<u32> = PortWriteOnly::new(PCI_CONFIG_ADDRESS);
        let mut data_port: Port<u32> = Port::new(PCI_CONFIG_DATA);

        unsafe {
            address_port.write(addr.cam_address(offset));
            data_port.write(value);
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn write32(&self, _addr: PciAddress, _offset: u8, _value: u32) {}
}
