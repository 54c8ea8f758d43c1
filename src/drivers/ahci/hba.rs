//! Typed views of the HBA register file
//!
//! Wraps a [`RegisterIo`] window with accessors that decode through the
//! tock-registers bitfields in [`regs`](super::regs).

use tock_registers::LocalRegisterCopy;
use tock_registers::fields::FieldValue;

use super::regs::*;
use crate::drivers::mmio::RegisterIo;

pub type CapValue = LocalRegisterCopy<u32, CAP::Register>;
pub type GhcValue = LocalRegisterCopy<u32, GHC::Register>;
pub type VsValue = LocalRegisterCopy<u32, VS::Register>;
pub type CmdValue = LocalRegisterCopy<u32, PORT_CMD::Register>;
pub type TfdValue = LocalRegisterCopy<u32, PORT_TFD::Register>;
pub type SstsValue = LocalRegisterCopy<u32, PORT_SSTS::Register>;
pub type SctlValue = LocalRegisterCopy<u32, PORT_SCTL::Register>;
pub type PortIsValue = LocalRegisterCopy<u32, PORT_IS::Register>;

/// Generic host control registers
pub struct Hba<R: RegisterIo> {
    io: R,
}

impl<R: RegisterIo> Hba<R> {
    pub fn new(io: R) -> Self {
        Self { io }
    }

    pub fn io(&self) -> &R {
        &self.io
    }

    pub fn into_inner(self) -> R {
        self.io
    }

    #[inline]
    pub fn cap(&self) -> CapValue {
        CapValue::new(self.io.read32(HBA_CAP))
    }

    #[inline]
    pub fn ghc(&self) -> GhcValue {
        GhcValue::new(self.io.read32(HBA_GHC))
    }

    #[inline]
    pub fn set_ghc(&self, value: u32) {
        self.io.write32(HBA_GHC, value);
    }

    /// Read-modify-write GHC
    pub fn modify_ghc(&self, field: FieldValue<u32, GHC::Register>) {
        let mut ghc = self.ghc();
        ghc.modify(field);
        self.io.write32(HBA_GHC, ghc.get());
    }

    #[inline]
    pub fn interrupt_status(&self) -> u32 {
        self.io.read32(HBA_IS)
    }

    /// Write-one-to-clear global interrupt status
    #[inline]
    pub fn clear_interrupt_status(&self, mask: u32) {
        self.io.write32(HBA_IS, mask);
    }

    #[inline]
    pub fn ports_implemented(&self) -> u32 {
        self.io.read32(HBA_PI)
    }

    #[inline]
    pub fn version(&self) -> VsValue {
        VsValue::new(self.io.read32(HBA_VS))
    }

    /// Register block of port `port`
    #[inline]
    pub fn port(&self, port: u8) -> PortRegs<'_, R> {
        PortRegs { io: &self.io, port }
    }
}

/// Register block of one port
pub struct PortRegs<'a, R: RegisterIo> {
    io: &'a R,
    port: u8,
}

impl<R: RegisterIo> PortRegs<'_, R> {
    #[inline]
    pub fn read(&self, reg: u64) -> u32 {
        self.io.read32(port_reg(self.port, reg))
    }

    #[inline]
    pub fn write(&self, reg: u64, value: u32) {
        self.io.write32(port_reg(self.port, reg), value)
    }

    #[inline]
    pub fn cmd(&self) -> CmdValue {
        CmdValue::new(self.read(PX_CMD))
    }

    /// Read-modify-write PxCMD
    pub fn modify_cmd(&self, field: FieldValue<u32, PORT_CMD::Register>) {
        let mut cmd = self.cmd();
        cmd.modify(field);
        self.write(PX_CMD, cmd.get());
    }

    /// Any of FRE, ST, FR or CR still set
    pub fn engine_running(&self) -> bool {
        let cmd = self.cmd();
        cmd.is_set(PORT_CMD::FRE)
            || cmd.is_set(PORT_CMD::ST)
            || cmd.is_set(PORT_CMD::FR)
            || cmd.is_set(PORT_CMD::CR)
    }

    #[inline]
    pub fn tfd(&self) -> TfdValue {
        TfdValue::new(self.read(PX_TFD))
    }

    /// Task file shows BSY or DRQ
    pub fn busy(&self) -> bool {
        let tfd = self.tfd();
        tfd.is_set(PORT_TFD::STS_BSY) || tfd.is_set(PORT_TFD::STS_DRQ)
    }

    #[inline]
    pub fn ssts(&self) -> SstsValue {
        SstsValue::new(self.read(PX_SSTS))
    }

    /// Device present and PHY communication established
    pub fn link_up(&self) -> bool {
        self.ssts().matches_all(PORT_SSTS::DET::PresentComm)
    }

    #[inline]
    pub fn sctl(&self) -> SctlValue {
        SctlValue::new(self.read(PX_SCTL))
    }

    #[inline]
    pub fn signature(&self) -> u32 {
        self.read(PX_SIG)
    }

    #[inline]
    pub fn interrupt_status(&self) -> PortIsValue {
        PortIsValue::new(self.read(PX_IS))
    }

    /// Write back whatever bits are set in PxIS
    pub fn clear_interrupt_status(&self) {
        let is = self.read(PX_IS);
        self.write(PX_IS, is);
    }

    /// Write back whatever bits are set in PxSERR
    pub fn clear_errors(&self) {
        let serr = self.read(PX_SERR);
        self.write(PX_SERR, serr);
    }

    /// Issue the command in slot 0
    #[inline]
    pub fn issue_slot0(&self) {
        self.write(PX_CI, 1);
    }
}
