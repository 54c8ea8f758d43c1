//! Simulated HBA for unit tests
//!
//! A register file with just enough reactive behaviour to drive the port
//! state machine and the command engine: write-one-to-clear status
//! registers, FR/CR following FRE/ST, self-clearing HBA reset and a command
//! processor that walks the command list in host memory.

use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use super::regs::*;
use crate::drivers::mmio::RegisterIo;

const REG_WORDS: usize = ((PORT_BASE + MAX_PORTS as u64 * PORT_SIZE) / 4) as usize;

const GHC_HR: u32 = 1 << 0;
const GHC_AE: u32 = 1 << 31;
const CMD_ST: u32 = 1 << 0;
const CMD_FRE: u32 = 1 << 4;
const CMD_FR: u32 = 1 << 14;
const CMD_CR: u32 = 1 << 15;
const IS_DHRS: u32 = 1 << 0;
const IS_TFES: u32 = 1 << 30;
const SCTL_DET_COMRESET: u32 = 1;

/// Behaviour of the device attached to a simulated port
#[derive(Clone)]
pub struct SimDevice {
    pub signature: u32,
    /// PHY comes up (SSTS.DET = 3)
    pub link_up: bool,
    /// TFD reads 0x50 instead of BSY
    pub ready: bool,
    /// FR/CR never drop once set
    pub stuck_engine: bool,
    /// CR never drops once set; FR behaves
    pub cr_stuck: bool,
    /// Commands never complete
    pub hang: bool,
    /// Complete every command with this (status, error) and TFES
    pub error: Option<(u8, u8)>,
    /// Returned for IDENTIFY DEVICE
    pub identify: Vec<u8>,
}

impl SimDevice {
    pub fn sata(identify: Vec<u8>) -> Self {
        Self {
            signature: SATA_SIG_ATA,
            link_up: true,
            ready: true,
            stuck_engine: false,
            cr_stuck: false,
            hang: false,
            error: None,
            identify,
        }
    }

    pub fn with_signature(signature: u32) -> Self {
        Self {
            signature,
            ..Self::sata(Vec::new())
        }
    }
}

pub struct SimHba {
    regs: Vec<Cell<u32>>,
    devices: RefCell<Vec<Option<SimDevice>>>,
    /// AE cannot be set
    pub ae_stuck_off: Cell<bool>,
    /// HR never self-clears
    pub hr_stuck: Cell<bool>,
    pub ghc_writes: RefCell<Vec<u32>>,
    pub resets: Cell<u32>,
    comresets: Vec<Cell<u32>>,
    commands: Cell<u32>,
    last_fis: RefCell<[u8; 20]>,
    last_header_dw0: Cell<u32>,
    last_prdt_dbc: Cell<u32>,
}

impl SimHba {
    /// HBA in AHCI mode with `num_ports` implemented ports and nothing attached
    pub fn new(num_ports: u8) -> Self {
        let sim = Self {
            regs: (0..REG_WORDS).map(|_| Cell::new(0)).collect(),
            devices: RefCell::new(vec![None; MAX_PORTS as usize]),
            ae_stuck_off: Cell::new(false),
            hr_stuck: Cell::new(false),
            ghc_writes: RefCell::new(Vec::new()),
            resets: Cell::new(0),
            comresets: (0..MAX_PORTS).map(|_| Cell::new(0)).collect(),
            commands: Cell::new(0),
            last_fis: RefCell::new([0; 20]),
            last_header_dw0: Cell::new(0),
            last_prdt_dbc: Cell::new(0),
        };
        let pi = if num_ports >= 32 {
            u32::MAX
        } else {
            (1u32 << num_ports) - 1
        };
        sim.poke(HBA_CAP, (num_ports.max(1) - 1) as u32 | 0x1F << 8);
        sim.poke(HBA_GHC, GHC_AE);
        sim.poke(HBA_PI, pi);
        sim.poke(HBA_VS, 0x0001_0301);
        for port in 0..MAX_PORTS {
            sim.poke(port_reg(port, PX_SIG), 0xFFFF_FFFF);
            sim.poke(port_reg(port, PX_TFD), 0x7F);
        }
        sim
    }

    /// Attach a device and latch its signature and link state
    pub fn attach(&self, port: u8, device: SimDevice) {
        self.poke(port_reg(port, PX_SIG), device.signature);
        self.poke(
            port_reg(port, PX_SSTS),
            if device.link_up { 0x123 } else { 0x001 },
        );
        self.poke(
            port_reg(port, PX_TFD),
            if device.ready { 0x50 } else { 0x80 },
        );
        if device.stuck_engine {
            self.poke(port_reg(port, PX_CMD), CMD_FRE | CMD_FR | CMD_ST | CMD_CR);
        }
        self.devices.borrow_mut()[port as usize] = Some(device);
    }

    /// Set a register without side effects
    pub fn poke(&self, offset: u64, value: u32) {
        self.regs[(offset / 4) as usize].set(value);
    }

    /// Read a register without side effects
    pub fn peek(&self, offset: u64) -> u32 {
        self.regs[(offset / 4) as usize].get()
    }

    pub fn comresets(&self, port: u8) -> u32 {
        self.comresets[port as usize].get()
    }

    pub fn commands_processed(&self) -> u32 {
        self.commands.get()
    }

    /// Host-to-device FIS of the last command processed
    pub fn last_fis(&self) -> [u8; 20] {
        *self.last_fis.borrow()
    }

    pub fn last_header_dw0(&self) -> u32 {
        self.last_header_dw0.get()
    }

    pub fn last_prdt_dbc(&self) -> u32 {
        self.last_prdt_dbc.get()
    }

    fn device(&self, port: u8) -> Option<SimDevice> {
        self.devices.borrow()[port as usize].clone()
    }

    fn write_ghc(&self, value: u32) {
        self.ghc_writes.borrow_mut().push(value);
        if value & GHC_HR != 0 {
            self.resets.set(self.resets.get() + 1);
            if self.hr_stuck.get() {
                self.poke(HBA_GHC, value);
            } else {
                // Reset completes instantly and drops the controller out of AHCI mode
                self.poke(HBA_GHC, 0);
            }
            return;
        }
        let value = if self.ae_stuck_off.get() {
            value & !GHC_AE
        } else {
            value
        };
        self.poke(HBA_GHC, value);
    }

    fn write_port(&self, port: u8, reg: u64, value: u32) {
        let offset = port_reg(port, reg);
        match reg {
            PX_IS | PX_SERR => self.poke(offset, self.peek(offset) & !value),
            PX_CMD => {
                let old = self.peek(offset);
                let device = self.device(port);
                let stuck = device.as_ref().is_some_and(|d| d.stuck_engine);
                let cr_stuck = device.as_ref().is_some_and(|d| d.cr_stuck);
                let mut new = value & !(CMD_FR | CMD_CR);
                if new & CMD_FRE != 0 {
                    new |= CMD_FR;
                }
                if new & CMD_ST != 0 {
                    new |= CMD_CR;
                }
                if stuck {
                    new |= old & (CMD_FR | CMD_CR);
                }
                if cr_stuck {
                    new |= old & CMD_CR;
                }
                if new & CMD_ST == 0 {
                    self.poke(port_reg(port, PX_CI), 0);
                }
                self.poke(offset, new);
            }
            PX_SCTL => {
                let old = self.peek(offset);
                self.poke(offset, value);
                if value & 0xF == SCTL_DET_COMRESET {
                    let count = &self.comresets[port as usize];
                    count.set(count.get() + 1);
                } else if old & 0xF == SCTL_DET_COMRESET {
                    self.poke(port_reg(port, PX_TFD), 0x50);
                }
            }
            PX_CI => {
                self.poke(offset, value);
                if value & 1 != 0 && self.peek(port_reg(port, PX_CMD)) & CMD_ST != 0 {
                    self.process_command(port);
                }
            }
            PX_TFD | PX_SIG | PX_SSTS => {}
            _ => self.poke(offset, value),
        }
    }

    fn process_command(&self, port: u8) {
        let Some(device) = self.device(port) else {
            return;
        };
        let clb = self.peek(port_reg(port, PX_CLB)) as u64
            | (self.peek(port_reg(port, PX_CLBU)) as u64) << 32;
        let fb = self.peek(port_reg(port, PX_FB)) as u64
            | (self.peek(port_reg(port, PX_FBU)) as u64) << 32;

        // SAFETY: the command list, table and data buffers live in host memory
        // handed out by HeapDma, which is identity mapped.
        unsafe {
            let header = clb as *const u32;
            let dw0 = header.read_volatile();
            let ctba = header.add(2).read_volatile() as u64
                | (header.add(3).read_volatile() as u64) << 32;
            self.last_header_dw0.set(dw0);

            let table = ctba as *const u8;
            let mut fis = [0u8; 20];
            core::ptr::copy_nonoverlapping(table, fis.as_mut_ptr(), 20);
            *self.last_fis.borrow_mut() = fis;

            let prdt = table.add(0x80) as *const u32;
            let dba = prdt.read_volatile() as u64 | (prdt.add(1).read_volatile() as u64) << 32;
            let dbc = prdt.add(3).read_volatile();
            self.last_prdt_dbc.set(dbc);
            self.commands.set(self.commands.get() + 1);

            if device.hang {
                self.poke(port_reg(port, PX_TFD), 0x80);
                return;
            }

            let byte_count = ((dbc & 0x3F_FFFF) + 1) as usize;
            if fis[2] == ATA_CMD_IDENTIFY && dba != 0 {
                let len = byte_count.min(device.identify.len());
                core::ptr::copy_nonoverlapping(device.identify.as_ptr(), dba as *mut u8, len);
            }

            let (status, error) = device.error.unwrap_or((0x50, 0));

            // D2H register FIS echoes the addressing registers
            let rfis = (fb as *mut u8).add(RFIS_D2H_OFFSET);
            let mut d2h = [0u8; 20];
            d2h[0] = FIS_TYPE_REG_D2H;
            d2h[2] = status;
            d2h[3] = error;
            d2h[4..14].copy_from_slice(&fis[4..14]);
            d2h[11] = 0;
            core::ptr::copy_nonoverlapping(d2h.as_ptr(), rfis, 20);
        }

        let (status, error) = device.error.unwrap_or((0x50, 0));
        self.poke(
            port_reg(port, PX_TFD),
            (error as u32) << 8 | status as u32,
        );
        let is = if device.error.is_some() {
            IS_TFES | IS_DHRS
        } else {
            IS_DHRS
        };
        self.poke(port_reg(port, PX_IS), is);
        self.poke(HBA_IS, self.peek(HBA_IS) | 1 << port);
        self.poke(port_reg(port, PX_CI), 0);
    }
}

impl RegisterIo for SimHba {
    fn read32(&self, offset: u64) -> u32 {
        self.peek(offset)
    }

    fn write32(&self, offset: u64, value: u32) {
        match offset {
            HBA_GHC => self.write_ghc(value),
            HBA_IS => self.poke(HBA_IS, self.peek(HBA_IS) & !value),
            HBA_CAP | HBA_PI | HBA_VS => {}
            o if o >= PORT_BASE => {
                let port = ((o - PORT_BASE) / PORT_SIZE) as u8;
                self.write_port(port, (o - PORT_BASE) % PORT_SIZE, value);
            }
            _ => self.poke(offset, value),
        }
    }
}

/// Build a 512-byte IDENTIFY DEVICE block
///
/// Strings are stored the way drives return them: two characters per word,
/// first character in the high byte.
pub fn identify_block(
    model: &str,
    serial: &str,
    firmware: &str,
    lba28: u32,
    lba48: Option<u64>,
) -> Vec<u8> {
    let mut words = [0u16; 256];

    let mut put_string = |start: usize, count: usize, s: &str| {
        let mut bytes = vec![b' '; count * 2];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        for i in 0..count {
            words[start + i] = (bytes[i * 2] as u16) << 8 | bytes[i * 2 + 1] as u16;
        }
    };
    put_string(10, 10, serial);
    put_string(23, 4, firmware);
    put_string(27, 20, model);

    words[60] = lba28 as u16;
    words[61] = (lba28 >> 16) as u16;
    if let Some(sectors) = lba48 {
        words[83] = 1 << 10;
        for i in 0..4 {
            words[100 + i] = (sectors >> (16 * i)) as u16;
        }
    }

    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
