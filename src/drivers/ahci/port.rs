//! Port lifecycle: allocation, reset, link bring-up and teardown
//!
//! A port goes Allocated -> LinkTrained -> Ready, runs commands while Ready
//! and is stopped and freed afterwards. Freeing (or dropping) a port puts
//! back the register values it found and returns its DMA memory.

use super::controller::AhciController;
use super::hba::PortRegs;
use super::regs::*;
use super::{AhciError, TaskFileRegisters};
use crate::drivers::dma::{DmaBuffer, DmaMemory};
use crate::drivers::mmio::RegisterIo;
use crate::time::{Clock, delay_ms, poll_until, retry, wait_for};

/// Where a port is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// DMA structures programmed, engine state unknown
    Allocated,
    /// PHY communication established
    LinkTrained,
    /// Engine running, commands may be issued
    Ready,
    /// ST cleared after use
    Stopped,
}

/// Register values found before allocation
#[derive(Debug, Clone, Copy)]
struct SavedRegisters {
    clb: u32,
    clbu: u32,
    fb: u32,
    fbu: u32,
    ie: u32,
    cmd: u32,
}

/// The three 1 KiB DMA areas owned by a port
pub(super) struct PortMemory {
    pub command_list: DmaBuffer,
    pub received_fis: DmaBuffer,
    pub command_table: DmaBuffer,
}

/// An allocated AHCI port
pub struct AhciPort<'c, R: RegisterIo, C: Clock, D: DmaMemory> {
    pub(super) controller: &'c AhciController<R, C>,
    dma: D,
    pub(super) number: u8,
    pub(super) memory: Option<PortMemory>,
    saved: SavedRegisters,
    pub(super) state: PortState,
    pub(super) last_registers: TaskFileRegisters,
}

impl<'c, R: RegisterIo, C: Clock, D: DmaMemory> AhciPort<'c, R, C, D> {
    /// Reserve the port's DMA structures and point the HBA at them
    pub fn allocate(
        controller: &'c AhciController<R, C>,
        mut dma: D,
        port: u8,
    ) -> Result<Self, AhciError> {
        if port >= MAX_PORTS {
            return Err(AhciError::InvalidPort);
        }

        let memory = Self::reserve(&mut dma).ok_or_else(|| {
            log::warn!("AHCI Port {}: DMA allocation failed", port);
            AhciError::AllocationFailure
        })?;

        let regs = controller.hba().port(port);
        let saved = SavedRegisters {
            clb: regs.read(PX_CLB),
            clbu: regs.read(PX_CLBU),
            fb: regs.read(PX_FB),
            fbu: regs.read(PX_FBU),
            ie: regs.read(PX_IE),
            cmd: regs.read(PX_CMD),
        };

        let clb = memory.command_list.phys_addr();
        let fb = memory.received_fis.phys_addr();
        regs.write(PX_CLB, clb as u32);
        regs.write(PX_CLBU, (clb >> 32) as u32);
        regs.write(PX_FB, fb as u32);
        regs.write(PX_FBU, (fb >> 32) as u32);

        log::debug!(
            "AHCI Port {}: CLB={:#x} FB={:#x} CTBA={:#x}",
            port,
            clb,
            fb,
            memory.command_table.phys_addr()
        );

        Ok(Self {
            controller,
            dma,
            number: port,
            memory: Some(memory),
            saved,
            state: PortState::Allocated,
            last_registers: TaskFileRegisters::default(),
        })
    }

    fn reserve(dma: &mut D) -> Option<PortMemory> {
        let command_list = dma.allocate(PORT_DMA_SIZE, PORT_DMA_ALIGN)?;
        let Some(received_fis) = dma.allocate(PORT_DMA_SIZE, PORT_DMA_ALIGN) else {
            dma.release(command_list);
            return None;
        };
        let Some(command_table) = dma.allocate(PORT_DMA_SIZE, PORT_DMA_ALIGN) else {
            dma.release(received_fis);
            dma.release(command_list);
            return None;
        };
        Some(PortMemory {
            command_list,
            received_fis,
            command_table,
        })
    }

    #[inline]
    pub(super) fn regs(&self) -> PortRegs<'c, R> {
        self.controller.hba().port(self.number)
    }

    /// Stop the command engine and mask and clear port interrupts
    ///
    /// Clears FRE and ST and checks again up to four times, 500 ms apart.
    pub fn reset(&mut self) -> Result<(), AhciError> {
        let regs = self.regs();
        let timeouts = self.controller.timeouts();

        let stopped = retry(
            self.controller.clock(),
            timeouts.port_stop_attempts,
            timeouts.port_stop_interval_ms,
            || {
                if !regs.engine_running() {
                    return true;
                }
                regs.modify_cmd(PORT_CMD::FRE::CLEAR + PORT_CMD::ST::CLEAR);
                false
            },
        );
        if !stopped {
            log::warn!(
                "AHCI Port {}: command engine did not stop (CMD={:#x})",
                self.number,
                regs.read(PX_CMD)
            );
            return Err(AhciError::PortQuiesceTimeout);
        }

        regs.write(PX_IE, 0);
        regs.clear_interrupt_status();
        self.state = PortState::Allocated;
        Ok(())
    }

    /// Spin up the device, wait for link and ready, then start the engine
    pub fn setup(&mut self) -> Result<(), AhciError> {
        let regs = self.regs();
        let clock = self.controller.clock();
        let timeouts = self.controller.timeouts();

        regs.modify_cmd(PORT_CMD::FRE::SET);
        if !regs.cmd().is_set(PORT_CMD::SUD) {
            regs.modify_cmd(PORT_CMD::SUD::SET);
            delay_ms(clock, timeouts.spin_up_ms);
        }

        if !poll_until(
            clock,
            timeouts.link_training_ms,
            timeouts.poll_interval_ms,
            || regs.link_up(),
        ) {
            log::debug!(
                "AHCI Port {}: No link (SSTS={:#x})",
                self.number,
                regs.read(PX_SSTS)
            );
            return Err(AhciError::LinkTrainingTimeout);
        }
        log::debug!("AHCI Port {}: link up", self.number);
        self.state = PortState::LinkTrained;

        regs.clear_errors();

        if !poll_until(
            clock,
            timeouts.device_ready_ms,
            timeouts.poll_interval_ms,
            || !regs.busy(),
        ) {
            log::warn!(
                "AHCI Port {}: Device not ready (TFD={:#x})",
                self.number,
                regs.read(PX_TFD)
            );
            return Err(AhciError::DeviceNotReadyTimeout);
        }

        if !wait_for(clock, timeouts.device_ready_ms, || {
            !regs.cmd().is_set(PORT_CMD::CR)
        }) {
            log::warn!("AHCI Port {}: command list still running", self.number);
            return Err(AhciError::PortQuiesceTimeout);
        }

        regs.modify_cmd(PORT_CMD::FRE::SET);
        regs.modify_cmd(PORT_CMD::ST::SET);
        self.state = PortState::Ready;
        Ok(())
    }

    /// Clear ST; the engine is not waited on
    pub fn stop(&mut self) {
        self.regs().modify_cmd(PORT_CMD::ST::CLEAR);
        self.state = PortState::Stopped;
    }

    /// Reset the port, restore its registers and release its memory
    pub fn free(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(memory) = self.memory.take() else {
            return;
        };

        if let Err(e) = self.reset() {
            log::warn!("AHCI Port {}: {} while freeing", self.number, e);
        }

        let regs = self.regs();
        regs.write(PX_CLB, self.saved.clb);
        regs.write(PX_CLBU, self.saved.clbu);
        regs.write(PX_FB, self.saved.fb);
        regs.write(PX_FBU, self.saved.fbu);
        regs.write(PX_IE, self.saved.ie);
        regs.write(PX_CMD, self.saved.cmd);

        self.dma.release(memory.command_table);
        self.dma.release(memory.received_fis);
        self.dma.release(memory.command_list);
        log::debug!("AHCI Port {}: freed", self.number);
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    /// Register snapshot published by the last command
    pub fn last_registers(&self) -> &TaskFileRegisters {
        &self.last_registers
    }

    /// Physical addresses of the command list, received-FIS area and command table
    pub fn dma_addresses(&self) -> Option<(u64, u64, u64)> {
        self.memory.as_ref().map(|m| {
            (
                m.command_list.phys_addr(),
                m.received_fis.phys_addr(),
                m.command_table.phys_addr(),
            )
        })
    }
}

impl<R: RegisterIo, C: Clock, D: DmaMemory> Drop for AhciPort<'_, R, C, D> {
    fn drop(&mut self) {
        self.teardown();
    }
}
