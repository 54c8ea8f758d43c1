//! AHCI register definitions
//!
//! Bitfields are declared with tock-registers and used to decode and build
//! values that travel through [`RegisterIo`](crate::drivers::mmio::RegisterIo)
//! as plain `u32`s.

use tock_registers::register_bitfields;

register_bitfields! [
    u32,
    /// Host Capabilities (CAP) Register
    pub CAP [
        /// Number of Ports (0's based)
        NP OFFSET(0) NUMBITS(5) []
    ],

    /// Global HBA Control (GHC) Register
    pub GHC [
        /// HBA Reset
        HR OFFSET(0) NUMBITS(1) [],
        /// Interrupt Enable
        IE OFFSET(1) NUMBITS(1) [],
        /// AHCI Enable
        AE OFFSET(31) NUMBITS(1) []
    ],

    /// Version (VS) Register
    pub VS [
        /// Minor Version Number
        MNR OFFSET(0) NUMBITS(16) [],
        /// Major Version Number
        MJR OFFSET(16) NUMBITS(16) []
    ],

    /// Port Command and Status (PxCMD) Register
    pub PORT_CMD [
        /// Start
        ST OFFSET(0) NUMBITS(1) [],
        /// Spin-Up Device
        SUD OFFSET(1) NUMBITS(1) [],
        /// FIS Receive Enable
        FRE OFFSET(4) NUMBITS(1) [],
        /// FIS Receive Running
        FR OFFSET(14) NUMBITS(1) [],
        /// Command List Running
        CR OFFSET(15) NUMBITS(1) []
    ],

    /// Port Task File Data (PxTFD) Register
    pub PORT_TFD [
        /// Status register
        STS OFFSET(0) NUMBITS(8) [],
        /// Status: Error
        STS_ERR OFFSET(0) NUMBITS(1) [],
        /// Status: Data Request
        STS_DRQ OFFSET(3) NUMBITS(1) [],
        /// Status: Device Ready
        STS_DRDY OFFSET(6) NUMBITS(1) [],
        /// Status: Busy
        STS_BSY OFFSET(7) NUMBITS(1) [],
        /// Error Register
        ERR OFFSET(8) NUMBITS(8) []
    ],

    /// Port Serial ATA Status (PxSSTS) Register
    pub PORT_SSTS [
        /// Device Detection
        DET OFFSET(0) NUMBITS(4) [
            PresentComm = 3
        ]
    ],

    /// Port Serial ATA Control (PxSCTL) Register
    pub PORT_SCTL [
        /// Device Detection Initialization
        DET OFFSET(0) NUMBITS(4) [
            Comreset = 1
        ]
    ],

    /// Port Interrupt Status (PxIS) Register
    pub PORT_IS [
        /// Device to Host Register FIS Interrupt
        DHRS OFFSET(0) NUMBITS(1) [],
        /// PIO Setup FIS Interrupt
        PSS OFFSET(1) NUMBITS(1) [],
        /// Task File Error Status
        TFES OFFSET(30) NUMBITS(1) []
    ]
];

// ============================================================================
// Register offsets
// ============================================================================

/// Host Capabilities
pub const HBA_CAP: u64 = 0x00;
/// Global HBA Control
pub const HBA_GHC: u64 = 0x04;
/// Interrupt Status
pub const HBA_IS: u64 = 0x08;
/// Ports Implemented
pub const HBA_PI: u64 = 0x0C;
/// Version
pub const HBA_VS: u64 = 0x10;

/// Port registers base offset from AHCI base
pub const PORT_BASE: u64 = 0x100;

/// Port register block size
pub const PORT_SIZE: u64 = 0x80;

/// Port Command List Base Address
pub const PX_CLB: u64 = 0x00;
/// Port Command List Base Address Upper
pub const PX_CLBU: u64 = 0x04;
/// Port FIS Base Address
pub const PX_FB: u64 = 0x08;
/// Port FIS Base Address Upper
pub const PX_FBU: u64 = 0x0C;
/// Port Interrupt Status
pub const PX_IS: u64 = 0x10;
/// Port Interrupt Enable
pub const PX_IE: u64 = 0x14;
/// Port Command and Status
pub const PX_CMD: u64 = 0x18;
/// Port Task File Data
pub const PX_TFD: u64 = 0x20;
/// Port Signature
pub const PX_SIG: u64 = 0x24;
/// Port Serial ATA Status
pub const PX_SSTS: u64 = 0x28;
/// Port Serial ATA Control
pub const PX_SCTL: u64 = 0x2C;
/// Port Serial ATA Error
pub const PX_SERR: u64 = 0x30;
/// Port Command Issue
pub const PX_CI: u64 = 0x38;

/// Size of the register window mapped from BAR5: generic registers plus
/// all 32 port blocks (0x100 + 32 * 0x80)
pub const HBA_MMIO_SIZE: usize = (PORT_BASE + MAX_PORTS as u64 * PORT_SIZE) as usize;

/// Highest port number an HBA can implement, plus one
pub const MAX_PORTS: u8 = 32;

// ============================================================================
// Device signatures
// ============================================================================

/// SATA device signature for ATA (hard drive)
pub const SATA_SIG_ATA: u32 = 0x00000101;

/// SATA device signature for ATAPI (CD/DVD)
pub const SATA_SIG_ATAPI: u32 = 0xEB140101;

/// SATA device signature for SEMB (Enclosure Management Bridge)
pub const SATA_SIG_SEMB: u32 = 0xC33C0101;

/// SATA device signature for Port Multiplier
pub const SATA_SIG_PM: u32 = 0x96690101;

// ============================================================================
// FIS and ATA
// ============================================================================

/// Register FIS - Host to Device
pub const FIS_TYPE_REG_H2D: u8 = 0x27;

/// Register FIS - Device to Host
pub const FIS_TYPE_REG_D2H: u8 = 0x34;

/// Offset of the D2H register FIS inside the received-FIS area
pub const RFIS_D2H_OFFSET: usize = 0x40;

/// Identify Device
pub const ATA_CMD_IDENTIFY: u8 = 0xEC;

/// SMART
pub const ATA_CMD_SMART: u8 = 0xB0;

/// Key values SMART expects in LBA mid/high
pub const SMART_LBA_MID: u8 = 0x4F;
pub const SMART_LBA_HIGH: u8 = 0xC2;

/// Device register value used for legacy commands (master, obsolete bits set)
pub const ATA_DEVICE_DEFAULT: u8 = 0xA0;

/// ATA status register bits
pub const ATA_SR_BSY: u8 = 0x80;
pub const ATA_SR_DRDY: u8 = 0x40;
pub const ATA_SR_DF: u8 = 0x20;
pub const ATA_SR_ERR: u8 = 0x01;

/// ATA sector size
pub const SECTOR_SIZE: u32 = 512;

/// Largest byte count one PRD entry can describe (22-bit DBC field)
pub const MAX_PRD_BYTES: usize = 0x40_0000;

/// Size and alignment of each per-port DMA structure
pub const PORT_DMA_SIZE: usize = 1024;
pub const PORT_DMA_ALIGN: usize = 1024;

/// Port register offset for `port`
#[inline]
pub const fn port_reg(port: u8, reg: u64) -> u64 {
    PORT_BASE + (port as u64) * PORT_SIZE + reg
}
