//! PCI function discovery
//!
//! Locates a function by its class triple and reads the handful of
//! configuration registers the storage drivers need.

pub mod access;

pub use access::{IoCamAccess, PciAccess};

/// PCI class codes for storage controllers
pub const CLASS_STORAGE: u8 = 0x01;
pub const SUBCLASS_SATA: u8 = 0x06;
pub const PROG_IF_AHCI: u8 = 0x01;

/// Invalid vendor ID (no device present)
const INVALID_VENDOR_ID: u16 = 0xFFFF;

/// Configuration space offsets
const REG_VENDOR_DEVICE: u8 = 0x00;
const REG_COMMAND: u8 = 0x04;
const REG_CLASS: u8 = 0x08;
const REG_HEADER_TYPE: u8 = 0x0E;
const REG_BAR0: u8 = 0x10;

/// Command register bits
pub const COMMAND_MEMORY_SPACE: u16 = 1 << 1;
pub const COMMAND_BUS_MASTER: u16 = 1 << 2;

const HEADER_TYPE_MULTI_FUNCTION: u8 = 0x80;

/// PCI device location (Bus:Device.Function)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PciAddress {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }

    /// Calculate legacy CAM address for a register
    fn cam_address(&self, offset: u8) -> u32 {
        let mut addr = 1u32 << 31; // Enable bit
        addr |= (self.bus as u32) << 16;
        addr |= (self.device as u32) << 11;
        addr |= (self.function as u32) << 8;
        addr |= (offset as u32) & 0xFC; // Must be 4-byte aligned
        addr
    }
}

impl core::fmt::Display for PciAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Identity and class of one PCI function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciFunction {
    pub address: PciAddress,
    pub vendor_id: u16,
    pub device_id: u16,
    pub class_code: u8,
    pub subclass: u8,
    pub prog_if: u8,
}

impl PciFunction {
    /// Read a function's identity, or `None` if nothing answers at `address`
    pub fn read<A: PciAccess + ?Sized>(access: &A, address: PciAddress) -> Option<Self> {
        let ids = access.read32(address, REG_VENDOR_DEVICE);
        let vendor_id = (ids & 0xFFFF) as u16;
        if vendor_id == INVALID_VENDOR_ID {
            return None;
        }

        let class_data = access.read32(address, REG_CLASS);
        Some(Self {
            address,
            vendor_id,
            device_id: (ids >> 16) as u16,
            prog_if: ((class_data >> 8) & 0xFF) as u8,
            subclass: ((class_data >> 16) & 0xFF) as u8,
            class_code: ((class_data >> 24) & 0xFF) as u8,
        })
    }

    /// Check the class triple
    pub fn matches(&self, class_code: u8, subclass: u8, prog_if: u8) -> bool {
        self.class_code == class_code && self.subclass == subclass && self.prog_if == prog_if
    }

    /// Check if this is an AHCI controller
    pub fn is_ahci(&self) -> bool {
        self.matches(CLASS_STORAGE, SUBCLASS_SATA, PROG_IF_AHCI)
    }
}

/// Find the first function with the given class triple
///
/// Functions 1-7 are only probed when function 0 reports a multi-function
/// header.
pub fn find_by_class<A: PciAccess + ?Sized>(
    access: &A,
    class_code: u8,
    subclass: u8,
    prog_if: u8,
) -> Option<PciFunction> {
    for bus in 0..=255u8 {
        for device in 0..32u8 {
            let Some(func0) = PciFunction::read(access, PciAddress::new(bus, device, 0)) else {
                continue;
            };
            if func0.matches(class_code, subclass, prog_if) {
                return Some(func0);
            }

            let header = access.read8(func0.address, REG_HEADER_TYPE);
            if header & HEADER_TYPE_MULTI_FUNCTION == 0 {
                continue;
            }

            for function in 1..8u8 {
                if let Some(func) = PciFunction::read(access, PciAddress::new(bus, device, function))
                    && func.matches(class_code, subclass, prog_if)
                {
                    return Some(func);
                }
            }
        }
    }
    None
}

/// Raw value of base address register `index` (0-5)
pub fn read_bar<A: PciAccess + ?Sized>(access: &A, address: PciAddress, index: u8) -> u32 {
    access.read32(address, REG_BAR0 + index * 4)
}

/// Enable memory space decoding and bus mastering
pub fn enable_memory_and_bus_master<A: PciAccess + ?Sized>(access: &A, address: PciAddress) {
    let cmd = access.read16(address, REG_COMMAND);
    let new_cmd = cmd | COMMAND_MEMORY_SPACE | COMMAND_BUS_MASTER;
    access.write16(address, REG_COMMAND, new_cmd);

    log::debug!(
        "Enabled device {}: cmd {:#06x} -> {:#06x}",
        address,
        cmd,
        new_cmd
    );
}

/// In-memory configuration space for tests
#[cfg(test)]
pub(crate) mod sim {
    use super::{PciAccess, PciAddress};
    use alloc::collections::BTreeMap;
    use core::cell::RefCell;

    #[derive(Default)]
    pub struct FakeConfigSpace {
        regs: RefCell<BTreeMap<(PciAddress, u8), u32>>,
    }

    impl FakeConfigSpace {
        /// Populate a type-0 function with the given identity and BAR5
        pub fn add_function(
            &self,
            address: PciAddress,
            vendor: u16,
            device: u16,
            class: (u8, u8, u8),
            bar5: u32,
        ) {
            let mut regs = self.regs.borrow_mut();
            regs.insert((address, 0x00), (device as u32) << 16 | vendor as u32);
            regs.insert(
                (address, 0x08),
                (class.0 as u32) << 24 | (class.1 as u32) << 16 | (class.2 as u32) << 8,
            );
            regs.insert((address, 0x24), bar5);
        }

        pub fn set(&self, address: PciAddress, offset: u8, value: u32) {
            self.regs.borrow_mut().insert((address, offset), value);
        }

        pub fn get(&self, address: PciAddress, offset: u8) -> u32 {
            self.read32(address, offset)
        }
    }

    impl PciAccess for FakeConfigSpace {
        fn read32(&self, addr: PciAddress, offset: u8) -> u32 {
            let regs = self.regs.borrow();
            match regs.get(&(addr, offset & !3)) {
                Some(&v) => v,
                // Absent functions read as all ones
                None if !regs.contains_key(&(addr, 0)) => 0xFFFF_FFFF,
                None => 0,
            }
        }

        fn write32(&self, addr: PciAddress, offset: u8, value: u32) {
            self.regs.borrow_mut().insert((addr, offset & !3), value);
        }
    }
}
