//! Command execution engine
//!
//! One command at a time in slot 0: build the header, FIS and a single PRD,
//! issue, poll for completion, publish the legacy register snapshot and
//! recover the port if the command failed.

use core::sync::atomic::{Ordering, fence};

use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use super::port::AhciPort;
use super::regs::*;
use super::AhciError;
use crate::drivers::dma::{DmaBuffer, DmaMemory};
use crate::drivers::mmio::RegisterIo;
use crate::time::{Clock, delay_ms, wait_for};

/// Data transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    None,
    /// Device to host
    Read,
    /// Host to device
    Write,
}

/// Classic ATA task-file registers
///
/// Mirrored from the D2H register FIS after every command, for callers
/// written against IDE semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskFileRegisters {
    pub status: u8,
    pub error: u8,
    pub device: u8,
    pub sector: u8,
    pub cyl_low: u8,
    pub cyl_high: u8,
    pub count: u8,
    pub sector_exp: u8,
    pub cyl_low_exp: u8,
    pub cyl_high_exp: u8,
    pub count_exp: u8,
}

/// A fully specified ATA command
#[derive(Debug, Clone, Copy, Default)]
pub struct AtaCommand {
    pub command: u8,
    pub features: u8,
    pub features_exp: u8,
    pub device: u8,
    /// LBA bits 0-7
    pub sector: u8,
    /// LBA bits 8-15
    pub cyl_low: u8,
    /// LBA bits 16-23
    pub cyl_high: u8,
    pub count: u8,
    /// LBA bits 24-31
    pub sector_exp: u8,
    /// LBA bits 32-39
    pub cyl_low_exp: u8,
    /// LBA bits 40-47
    pub cyl_high_exp: u8,
    pub count_exp: u8,
    pub direction: Direction,
    /// Transfer length in bytes
    pub length: usize,
}

/// Command Header (32 bytes)
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct CommandHeader {
    /// DW0: CFL (0-4), W (6), PRDTL (16-31)
    dw0: u32,
    /// DW1: bytes transferred, updated by the HBA
    prdbc: u32,
    ctba: u32,
    ctbau: u32,
    reserved: [u32; 4],
}

impl CommandHeader {
    fn new(write: bool, ctba: u64) -> Self {
        let mut dw0 = FIS_REG_H2D_DWORDS | 1 << 16;
        if write {
            dw0 |= 1 << 6;
        }
        Self {
            dw0,
            prdbc: 0,
            ctba: ctba as u32,
            ctbau: (ctba >> 32) as u32,
            reserved: [0; 4],
        }
    }
}

/// Length of the H2D register FIS in dwords
const FIS_REG_H2D_DWORDS: u32 = 5;

/// Offset of the PRDT inside the command table
const PRDT_OFFSET: usize = 0x80;

/// FIS Register - Host to Device (20 bytes)
#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
struct FisRegH2D {
    fis_type: u8,
    /// Port multiplier, Command bit
    pm_c: u8,
    command: u8,
    feature_l: u8,
    lba0: u8,
    lba1: u8,
    lba2: u8,
    device: u8,
    lba3: u8,
    lba4: u8,
    lba5: u8,
    feature_h: u8,
    count_l: u8,
    count_h: u8,
    icc: u8,
    control: u8,
    reserved: [u8; 4],
}

impl From<&AtaCommand> for FisRegH2D {
    fn from(cmd: &AtaCommand) -> Self {
        Self {
            fis_type: FIS_TYPE_REG_H2D,
            pm_c: 0x80,
            command: cmd.command,
            feature_l: cmd.features,
            lba0: cmd.sector,
            lba1: cmd.cyl_low,
            lba2: cmd.cyl_high,
            device: cmd.device,
            lba3: cmd.sector_exp,
            lba4: cmd.cyl_low_exp,
            lba5: cmd.cyl_high_exp,
            feature_h: cmd.features_exp,
            count_l: cmd.count,
            count_h: cmd.count_exp,
            ..Default::default()
        }
    }
}

/// Physical Region Descriptor Table Entry (16 bytes)
#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
struct PrdtEntry {
    dba: u32,
    dbau: u32,
    reserved: u32,
    /// Byte count - 1 (bits 0-21), interrupt on completion (bit 31)
    dbc: u32,
}

/// FIS Register - Device to Host (20 bytes)
#[repr(C, packed)]
#[derive(FromBytes, Immutable, KnownLayout, Unaligned, Clone, Copy, Default)]
struct FisRegD2H {
    fis_type: u8,
    pm_i: u8,
    status: u8,
    error: u8,
    lba0: u8,
    lba1: u8,
    lba2: u8,
    device: u8,
    lba3: u8,
    lba4: u8,
    lba5: u8,
    reserved0: u8,
    count_l: u8,
    count_h: u8,
    reserved1: [u8; 6],
}

/// Byte count programmed into the PRD for a transfer of `length` bytes
#[inline]
fn transfer_size(length: usize) -> usize {
    length.max(SECTOR_SIZE as usize)
}

/// Status bits that indicate the command succeeded
fn status_ok(status: u8) -> bool {
    status & (ATA_SR_BSY | ATA_SR_DF | ATA_SR_ERR) == 0 && status & ATA_SR_DRDY != 0
}

impl<R: RegisterIo, C: Clock, D: DmaMemory> AhciPort<'_, R, C, D> {
    /// Issue `cmd` and wait for it to finish
    ///
    /// Returns the register snapshot on success. A failed command leaves the
    /// port recovered and running again, but is not retried.
    pub fn execute(
        &mut self,
        cmd: &AtaCommand,
        buffer: Option<&mut DmaBuffer>,
    ) -> Result<TaskFileRegisters, AhciError> {
        if self.state != super::PortState::Ready {
            return Err(AhciError::PortNotReady);
        }
        let Some(memory) = self.memory.as_mut() else {
            return Err(AhciError::PortNotReady);
        };

        if cmd.length > MAX_PRD_BYTES {
            return Err(AhciError::TransferTooLarge);
        }
        let size = transfer_size(cmd.length);
        let dba = match buffer {
            Some(buf) if buf.len() < size => return Err(AhciError::BufferTooSmall),
            Some(buf) => buf.phys_addr(),
            // A data phase always needs somewhere to land
            None if cmd.direction != Direction::None => return Err(AhciError::BufferTooSmall),
            None => 0,
        };

        memory.command_list.clear();
        memory.command_table.clear();

        let header = CommandHeader::new(
            cmd.direction == Direction::Write,
            memory.command_table.phys_addr(),
        );
        let prd = PrdtEntry {
            dba: dba as u32,
            dbau: (dba >> 32) as u32,
            reserved: 0,
            dbc: (size as u32 - 1) | 1 << 31,
        };

        // SAFETY: both buffers are PORT_DMA_SIZE bytes and PORT_DMA_ALIGN aligned,
        // large enough for one header and a table with one PRD
        unsafe {
            (memory.command_list.as_ptr() as *mut CommandHeader).write_volatile(header);
            let table = memory.command_table.as_ptr();
            (table as *mut FisRegH2D).write_volatile(FisRegH2D::from(cmd));
            (table.add(PRDT_OFFSET) as *mut PrdtEntry).write_volatile(prd);
        }

        log::trace!(
            "AHCI Port {}: issuing command {:#04x} ({:?}, {} bytes)",
            self.number,
            cmd.command,
            cmd.direction,
            size
        );

        fence(Ordering::SeqCst);

        let regs = self.regs();
        let clock = self.controller.clock();
        let timeouts = self.controller.timeouts();

        regs.clear_interrupt_status();
        regs.issue_slot0();

        let mut task_file = None;
        let completed = wait_for(clock, timeouts.command_ms, || {
            let is = regs.interrupt_status();
            if is.get() == 0 {
                return false;
            }
            regs.write(PX_IS, is.get());
            if is.is_set(PORT_IS::TFES) || is.is_set(PORT_IS::DHRS) || is.is_set(PORT_IS::PSS) {
                let tfd = regs.tfd();
                task_file = Some((tfd.read(PORT_TFD::STS) as u8, tfd.read(PORT_TFD::ERR) as u8));
                return true;
            }
            false
        });
        let (status, error) = match task_file {
            Some(tf) if completed => tf,
            _ => (0xFF, 0xFF),
        };

        self.controller.acknowledge_port(self.number);

        fence(Ordering::SeqCst);
        self.last_registers = self.read_received_fis(status, error);

        if status_ok(status) {
            return Ok(self.last_registers);
        }

        let failure = if completed {
            log::warn!(
                "AHCI Port {}: command {:#04x} failed: status={:#04x} error={:#04x}",
                self.number,
                cmd.command,
                status,
                error
            );
            AhciError::TaskFileError { status, error }
        } else {
            log::warn!(
                "AHCI Port {}: command {:#04x} timed out",
                self.number,
                cmd.command
            );
            AhciError::CommandTimeout
        };

        if let Err(e) = self.recover() {
            self.state = super::PortState::Stopped;
            return Err(e);
        }
        Err(failure)
    }

    /// Build the legacy snapshot from the received D2H register FIS
    fn read_received_fis(&self, status: u8, error: u8) -> TaskFileRegisters {
        let fis = self
            .memory
            .as_ref()
            .and_then(|m| m.received_fis.as_slice().get(RFIS_D2H_OFFSET..))
            .and_then(|bytes| FisRegD2H::read_from_prefix(bytes).ok())
            .map(|(fis, _)| fis)
            .unwrap_or_default();

        TaskFileRegisters {
            status,
            error,
            device: fis.device,
            sector: fis.lba0,
            cyl_low: fis.lba1,
            cyl_high: fis.lba2,
            count: fis.count_l,
            sector_exp: fis.lba3,
            cyl_low_exp: fis.lba4,
            cyl_high_exp: fis.lba5,
            count_exp: fis.count_h,
        }
    }

    /// Bring the port back to a runnable state after a failed command
    ///
    /// Stops the engine, clears errors and interrupts, issues a COMRESET if
    /// the device is still busy, then restarts the engine.
    fn recover(&mut self) -> Result<(), AhciError> {
        let regs = self.regs();
        let clock = self.controller.clock();
        let timeouts = self.controller.timeouts();

        regs.modify_cmd(PORT_CMD::ST::CLEAR);
        if !wait_for(clock, timeouts.recovery_ms, || {
            !regs.cmd().is_set(PORT_CMD::CR)
        }) {
            log::error!("AHCI Port {}: engine did not stop for recovery", self.number);
            return Err(AhciError::PortQuiesceTimeout);
        }

        regs.clear_errors();
        regs.clear_interrupt_status();

        if regs.busy() {
            log::debug!("AHCI Port {}: device busy, issuing COMRESET", self.number);
            let sctl = regs.sctl();
            let mut comreset = sctl;
            comreset.modify(PORT_SCTL::DET::Comreset);
            regs.write(PX_SCTL, comreset.get());
            delay_ms(clock, timeouts.comreset_ms);
            regs.write(PX_SCTL, sctl.get());
        }

        regs.modify_cmd(PORT_CMD::ST::SET);
        Ok(())
    }

    /// Legacy 28-bit command without address registers
    ///
    /// SMART gets its signature in LBA mid/high. A data phase is always one
    /// 512-byte sector.
    pub fn send_command(
        &mut self,
        command: u8,
        features: u8,
        count: u8,
        direction: Direction,
        buffer: Option<&mut DmaBuffer>,
    ) -> Result<TaskFileRegisters, AhciError> {
        let (cyl_low, cyl_high) = if command == ATA_CMD_SMART {
            (SMART_LBA_MID, SMART_LBA_HIGH)
        } else {
            (0, 0)
        };
        let cmd = AtaCommand {
            command,
            features,
            count,
            cyl_low,
            cyl_high,
            device: ATA_DEVICE_DEFAULT,
            direction,
            length: if direction == Direction::None {
                0
            } else {
                SECTOR_SIZE as usize
            },
            ..Default::default()
        };
        self.execute(&cmd, buffer)
    }

    /// 28-bit command with explicit address registers and length
    #[allow(clippy::too_many_arguments)]
    pub fn send_command_extended(
        &mut self,
        command: u8,
        features: u8,
        sector: u8,
        cyl_low: u8,
        cyl_high: u8,
        count: u8,
        device: u8,
        direction: Direction,
        buffer: Option<&mut DmaBuffer>,
        length: usize,
    ) -> Result<TaskFileRegisters, AhciError> {
        let cmd = AtaCommand {
            command,
            features,
            sector,
            cyl_low,
            cyl_high,
            count,
            device,
            direction,
            length,
            ..Default::default()
        };
        self.execute(&cmd, buffer)
    }

    /// 48-bit command; `registers` supplies the low and high address and count bytes
    pub fn send_command_extended_48bit(
        &mut self,
        command: u8,
        features: u16,
        registers: &TaskFileRegisters,
        direction: Direction,
        buffer: Option<&mut DmaBuffer>,
        length: usize,
    ) -> Result<TaskFileRegisters, AhciError> {
        let cmd = AtaCommand {
            command,
            features: features as u8,
            features_exp: (features >> 8) as u8,
            device: registers.device,
            sector: registers.sector,
            cyl_low: registers.cyl_low,
            cyl_high: registers.cyl_high,
            count: registers.count,
            sector_exp: registers.sector_exp,
            cyl_low_exp: registers.cyl_low_exp,
            cyl_high_exp: registers.cyl_high_exp,
            count_exp: registers.count_exp,
            direction,
            length,
        };
        self.execute(&cmd, buffer)
    }

    /// IDENTIFY DEVICE into a buffer of at least one sector
    pub fn identify(&mut self, buffer: &mut DmaBuffer) -> Result<TaskFileRegisters, AhciError> {
        self.send_command(ATA_CMD_IDENTIFY, 0, 0, Direction::Read, Some(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ahci::sim::{SimDevice, SimHba, identify_block};
    use crate::drivers::ahci::{AhciController, PortState, Timeouts};
    use crate::drivers::dma::HeapDma;
    use crate::time::sim::SimClock;

    const CMD_ST: u32 = 1 << 0;

    fn disk() -> SimDevice {
        SimDevice::sata(identify_block("TEST DISK", "S1", "1.0", 1000, None))
    }

    /// Run `f` against a ready port 0 with `device` attached
    fn with_ready_port(
        device: SimDevice,
        f: impl FnOnce(&SimHba, &SimClock, &mut AhciPort<'_, &SimHba, &SimClock, HeapDma>),
    ) {
        let sim = SimHba::new(1);
        sim.attach(0, device);
        let clock = SimClock::new(1000);
        let ctrl = AhciController::new(&sim, &clock, Timeouts::default()).unwrap();
        let mut port = AhciPort::allocate(&ctrl, HeapDma::new(), 0).unwrap();
        port.reset().unwrap();
        port.setup().unwrap();
        f(&sim, &clock, &mut port);
    }

    #[test]
    fn test_struct_sizes() {
        assert_eq!(core::mem::size_of::<CommandHeader>(), 32);
        assert_eq!(core::mem::size_of::<FisRegH2D>(), 20);
        assert_eq!(core::mem::size_of::<FisRegD2H>(), 20);
        assert_eq!(core::mem::size_of::<PrdtEntry>(), 16);
    }

    #[test]
    fn test_identify_success() {
        with_ready_port(disk(), |sim, _, port| {
            let mut dma = HeapDma::new();
            let mut buf = dma.allocate(512, 512).unwrap();
            let regs = port.identify(&mut buf).unwrap();

            assert_eq!(regs.status, 0x50);
            assert_eq!(regs.error, 0);
            assert_eq!(sim.last_header_dw0(), 0x0001_0005);
            assert_eq!(sim.last_prdt_dbc(), 511 | 1 << 31);

            let fis = sim.last_fis();
            assert_eq!(fis[0], FIS_TYPE_REG_H2D);
            assert_eq!(fis[1], 0x80);
            assert_eq!(fis[2], ATA_CMD_IDENTIFY);
            assert_eq!(fis[7], ATA_DEVICE_DEFAULT);

            // Serial starts at word 10, first character in the high byte
            assert_eq!(&buf.as_slice()[20..22], b"1S");
            // Interrupt acknowledged at the HBA
            assert_eq!(sim.peek(HBA_IS), 0);
            assert_eq!(port.state(), PortState::Ready);
            dma.release(buf);
        });
    }

    #[test]
    fn test_write_direction_and_byte_count() {
        with_ready_port(disk(), |sim, _, port| {
            let mut dma = HeapDma::new();
            let mut buf = dma.allocate(4096, 512).unwrap();

            port.send_command_extended(
                0x30,
                0,
                0,
                0,
                0,
                8,
                0xE0,
                Direction::Write,
                Some(&mut buf),
                4096,
            )
            .unwrap();
            assert_eq!(sim.last_header_dw0(), 0x0001_0045);
            assert_eq!(sim.last_prdt_dbc(), 4095 | 1 << 31);

            // Short transfers still program a full sector
            port.send_command_extended(
                0x20,
                0,
                0,
                0,
                0,
                1,
                0xE0,
                Direction::Read,
                Some(&mut buf),
                100,
            )
            .unwrap();
            assert_eq!(sim.last_header_dw0(), 0x0001_0005);
            assert_eq!(sim.last_prdt_dbc(), 511 | 1 << 31);
            dma.release(buf);
        });
    }

    #[test]
    fn test_smart_injects_signature() {
        with_ready_port(disk(), |sim, _, port| {
            port.send_command(ATA_CMD_SMART, 0xDA, 0, Direction::None, None)
                .unwrap();
            let fis = sim.last_fis();
            assert_eq!(fis[2], ATA_CMD_SMART);
            assert_eq!(fis[3], 0xDA);
            assert_eq!(fis[5], SMART_LBA_MID);
            assert_eq!(fis[6], SMART_LBA_HIGH);
            assert_eq!(fis[7], ATA_DEVICE_DEFAULT);

            port.send_command(0xE7, 0, 0, Direction::None, None).unwrap();
            let fis = sim.last_fis();
            assert_eq!(fis[5], 0);
            assert_eq!(fis[6], 0);
        });
    }

    #[test]
    fn test_48bit_layout_and_snapshot() {
        with_ready_port(disk(), |sim, _, port| {
            let mut dma = HeapDma::new();
            let mut buf = dma.allocate(1024, 512).unwrap();
            let input = TaskFileRegisters {
                device: 0x40,
                sector: 0x01,
                cyl_low: 0x02,
                cyl_high: 0x03,
                count: 0x02,
                sector_exp: 0x04,
                cyl_low_exp: 0x05,
                cyl_high_exp: 0x06,
                count_exp: 0x00,
                ..Default::default()
            };
            let out = port
                .send_command_extended_48bit(
                    0x25,
                    0x1234,
                    &input,
                    Direction::Read,
                    Some(&mut buf),
                    1024,
                )
                .unwrap();

            let fis = sim.last_fis();
            assert_eq!(fis[3], 0x34);
            assert_eq!(fis[11], 0x12);
            assert_eq!(&fis[4..11], &[0x01, 0x02, 0x03, 0x40, 0x04, 0x05, 0x06]);
            assert_eq!(&fis[12..14], &[0x02, 0x00]);

            // Snapshot mirrors the D2H FIS
            assert_eq!(out.status, 0x50);
            assert_eq!(out.sector, 0x01);
            assert_eq!(out.cyl_high_exp, 0x06);
            assert_eq!(out.device, 0x40);
            assert_eq!(out.count, 0x02);
            assert_eq!(port.last_registers(), &out);
            dma.release(buf);
        });
    }

    #[test]
    fn test_timeout_recovers_with_comreset() {
        let mut device = disk();
        device.hang = true;
        with_ready_port(device, |sim, clock, port| {
            let start = clock.now_ms();
            assert_eq!(
                port.send_command(0xE7, 0, 0, Direction::None, None),
                Err(AhciError::CommandTimeout)
            );
            assert!(clock.now_ms() - start >= 20_000);
            assert_eq!(port.last_registers().status, 0xFF);
            assert_eq!(port.last_registers().error, 0xFF);
            assert_eq!(sim.comresets(0), 1);
            assert_eq!(sim.peek(port_reg(0, PX_CMD)) & CMD_ST, CMD_ST);
            assert_eq!(port.state(), PortState::Ready);
        });
    }

    #[test]
    fn test_task_file_error() {
        let mut device = disk();
        device.error = Some((0x51, 0x04));
        with_ready_port(device, |sim, _, port| {
            assert_eq!(
                port.send_command(ATA_CMD_SMART, 0xD0, 0, Direction::None, None),
                Err(AhciError::TaskFileError {
                    status: 0x51,
                    error: 0x04
                })
            );
            assert_eq!(sim.commands_processed(), 1);
            assert_eq!(sim.comresets(0), 0);
            assert_eq!(sim.peek(port_reg(0, PX_CMD)) & CMD_ST, CMD_ST);
            assert_eq!(sim.peek(port_reg(0, PX_IS)), 0);
        });
    }

    #[test]
    fn test_data_phase_requires_buffer() {
        with_ready_port(disk(), |sim, _, port| {
            assert_eq!(
                port.send_command(ATA_CMD_IDENTIFY, 0, 0, Direction::Read, None),
                Err(AhciError::BufferTooSmall)
            );
            assert_eq!(
                port.send_command_extended(
                    0x30,
                    0,
                    0,
                    0,
                    0,
                    1,
                    0xE0,
                    Direction::Write,
                    None,
                    512
                ),
                Err(AhciError::BufferTooSmall)
            );
            assert_eq!(sim.commands_processed(), 0);

            // Non-data commands still go out without a buffer
            port.send_command(0xE7, 0, 0, Direction::None, None).unwrap();
            assert_eq!(sim.commands_processed(), 1);
        });
    }

    #[test]
    fn test_transfer_length_limited_to_one_prd() {
        with_ready_port(disk(), |sim, _, port| {
            let mut dma = HeapDma::new();
            let mut buf = dma.allocate(MAX_PRD_BYTES, 4096).unwrap();

            let mut cmd = AtaCommand {
                command: 0x25,
                device: 0x40,
                direction: Direction::Read,
                length: MAX_PRD_BYTES + 512,
                ..Default::default()
            };
            assert_eq!(
                port.execute(&cmd, Some(&mut buf)),
                Err(AhciError::TransferTooLarge)
            );
            assert_eq!(sim.commands_processed(), 0);

            cmd.length = MAX_PRD_BYTES;
            port.execute(&cmd, Some(&mut buf)).unwrap();
            assert_eq!(sim.last_prdt_dbc(), 0x3F_FFFF | 1 << 31);
            dma.release(buf);
        });
    }

    #[test]
    fn test_failed_recovery_stops_port() {
        let mut device = disk();
        device.hang = true;
        device.cr_stuck = true;
        with_ready_port(device, |sim, clock, port| {
            let start = clock.now_ms();
            assert_eq!(
                port.send_command(0xE7, 0, 0, Direction::None, None),
                Err(AhciError::PortQuiesceTimeout)
            );
            // Command budget plus the CR wait
            assert!(clock.now_ms() - start >= 30_000);
            assert_eq!(port.state(), PortState::Stopped);
            // Engine never restarted, no COMRESET attempted
            assert_eq!(sim.peek(port_reg(0, PX_CMD)) & CMD_ST, 0);
            assert_eq!(sim.comresets(0), 0);

            assert_eq!(
                port.send_command(0xE7, 0, 0, Direction::None, None),
                Err(AhciError::PortNotReady)
            );
            assert_eq!(sim.commands_processed(), 1);
        });
    }

    #[test]
    fn test_rejects_unready_port_and_short_buffer() {
        let sim = SimHba::new(1);
        sim.attach(0, disk());
        let clock = SimClock::new(1000);
        let ctrl = AhciController::new(&sim, &clock, Timeouts::default()).unwrap();
        let mut dma = HeapDma::new();
        let mut buf = dma.allocate(256, 256).unwrap();

        let mut port = AhciPort::allocate(&ctrl, HeapDma::new(), 0).unwrap();
        assert_eq!(
            port.send_command(0xE7, 0, 0, Direction::None, None),
            Err(AhciError::PortNotReady)
        );

        port.reset().unwrap();
        port.setup().unwrap();
        assert_eq!(port.identify(&mut buf), Err(AhciError::BufferTooSmall));
        assert_eq!(sim.commands_processed(), 0);

        port.stop();
        assert_eq!(
            port.send_command(0xE7, 0, 0, Direction::None, None),
            Err(AhciError::PortNotReady)
        );
        drop(port);
        dma.release(buf);
    }
}
