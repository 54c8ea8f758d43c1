//! HBA-wide state: AHCI mode, global reset and restoration on exit

use super::hba::Hba;
use super::regs::*;
use super::{AhciError, DeviceType, Timeouts};
use crate::drivers::mmio::RegisterIo;
use crate::time::{Clock, retry, wait_for};

/// An AHCI host bus adapter
///
/// Created once per session. Remembers whether the HBA was in AHCI mode and
/// had interrupts enabled on entry so [`AhciController::shutdown`] can put it
/// back the way it was found.
pub struct AhciController<R: RegisterIo, C: Clock> {
    hba: Hba<R>,
    clock: C,
    timeouts: Timeouts,
    initial_ahci_enabled: bool,
    initial_interrupts: bool,
    num_ports: u8,
    ports_implemented: u32,
}

impl<R: RegisterIo, C: Clock> AhciController<R, C> {
    /// Take over the HBA behind `io`
    ///
    /// An HBA found in legacy mode is switched to AHCI, reset and switched
    /// again, since the reset drops it back out of AHCI mode.
    pub fn new(io: R, clock: C, timeouts: Timeouts) -> Result<Self, AhciError> {
        let hba = Hba::new(io);
        let initial_ahci_enabled = hba.ghc().is_set(GHC::AE);

        let mut controller = Self {
            hba,
            clock,
            timeouts,
            initial_ahci_enabled,
            initial_interrupts: false,
            num_ports: 0,
            ports_implemented: 0,
        };

        if initial_ahci_enabled {
            controller.initial_interrupts = controller.query_interrupt_flag();
        } else {
            log::info!("AHCI: controller in legacy mode, switching to AHCI");
            controller.enable()?;
            controller.reset()?;
            controller.enable()?;
        }

        controller.hba.clear_interrupt_status(0xFFFF_FFFF);

        let cap = controller.hba.cap();
        let version = controller.hba.version();
        controller.num_ports = cap.read(CAP::NP) as u8 + 1;
        controller.ports_implemented = controller.hba.ports_implemented();

        log::info!(
            "AHCI version: {}.{}",
            version.read(VS::MJR),
            version.read(VS::MNR)
        );
        log::debug!(
            "AHCI CAP: {:#x}, ports={}, PI={:#010x}, initial AE={} IE={}",
            cap.get(),
            controller.num_ports,
            controller.ports_implemented,
            controller.initial_ahci_enabled,
            controller.initial_interrupts
        );

        Ok(controller)
    }

    /// Set GHC.AE, re-reading up to the configured number of attempts
    pub fn enable(&self) -> Result<(), AhciError> {
        if self.query_state() {
            return Ok(());
        }

        let hba = &self.hba;
        let enabled = retry(
            &self.clock,
            self.timeouts.enable_attempts,
            self.timeouts.enable_retry_ms,
            || {
                hba.modify_ghc(GHC::AE::SET);
                hba.ghc().is_set(GHC::AE)
            },
        );
        if !enabled {
            log::error!("AHCI: could not enable AHCI mode (GHC={:#x})", hba.ghc().get());
            return Err(AhciError::ControllerEnableTimeout);
        }
        Ok(())
    }

    /// Clear GHC, leaving AHCI mode
    pub fn disable(&self) -> Result<(), AhciError> {
        if !self.query_state() {
            return Ok(());
        }

        let hba = &self.hba;
        let disabled = retry(
            &self.clock,
            self.timeouts.enable_attempts,
            self.timeouts.enable_retry_ms,
            || {
                hba.set_ghc(0);
                !hba.ghc().is_set(GHC::AE)
            },
        );
        if !disabled {
            log::warn!("AHCI: could not leave AHCI mode (GHC={:#x})", hba.ghc().get());
            return Err(AhciError::ControllerEnableTimeout);
        }
        Ok(())
    }

    /// Global HBA reset
    ///
    /// Requires AHCI mode. If HR is already set the write is skipped and only
    /// the wait for self-clear happens.
    pub fn reset(&self) -> Result<(), AhciError> {
        self.enable()?;

        let hba = &self.hba;
        if !hba.ghc().is_set(GHC::HR) {
            log::debug!("AHCI: resetting HBA");
            hba.modify_ghc(GHC::HR::SET);
        }

        if !wait_for(&self.clock, self.timeouts.controller_reset_ms, || {
            !hba.ghc().is_set(GHC::HR)
        }) {
            log::error!(
                "AHCI: HBA reset didn't complete within {}ms",
                self.timeouts.controller_reset_ms
            );
            return Err(AhciError::ControllerResetTimeout);
        }
        Ok(())
    }

    /// Whether the HBA is currently in AHCI mode
    pub fn query_state(&self) -> bool {
        self.hba.ghc().is_set(GHC::AE)
    }

    /// Whether the global interrupt enable bit is set
    pub fn query_interrupt_flag(&self) -> bool {
        self.hba.ghc().is_set(GHC::IE)
    }

    /// Clear `port`'s bit in the global interrupt status
    pub fn acknowledge_port(&self, port: u8) {
        if port < MAX_PORTS {
            self.hba.clear_interrupt_status(1 << port);
        }
    }

    /// Device type from the port's signature register
    pub fn classify(&self, port: u8) -> DeviceType {
        if port >= MAX_PORTS {
            return DeviceType::Unknown;
        }
        DeviceType::from_signature(self.hba.port(port).signature())
    }

    /// Put the HBA back into the state it was found in
    ///
    /// Failures are logged; there is nothing left to recover at this point.
    pub fn shutdown(self) {
        if !self.initial_ahci_enabled
            && let Err(e) = self.reset()
        {
            log::warn!("AHCI: reset before exit failed: {}", e);
        }

        if self.initial_ahci_enabled {
            log::info!("AHCI: restoring AHCI mode found on entry");
            if let Err(e) = self.enable() {
                log::warn!("AHCI: {}", e);
            }
            if self.initial_interrupts {
                self.hba.modify_ghc(GHC::IE::SET);
            }
        } else if let Err(e) = self.disable() {
            log::warn!("AHCI: {}", e);
        }
    }

    pub fn hba(&self) -> &Hba<R> {
        &self.hba
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Number of ports from CAP.NP
    pub fn num_ports(&self) -> u8 {
        self.num_ports
    }

    /// Ports-implemented bitmap
    pub fn ports_implemented(&self) -> u32 {
        self.ports_implemented
    }

    pub fn port_implemented(&self, port: u8) -> bool {
        port < MAX_PORTS && self.ports_implemented & (1 << port) != 0
    }

    pub fn initial_ahci_enabled(&self) -> bool {
        self.initial_ahci_enabled
    }

    pub fn initial_interrupts(&self) -> bool {
        self.initial_interrupts
    }
}
