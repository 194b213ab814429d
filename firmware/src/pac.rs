//! Hand-modeled register blocks for the KL25Z's USB0 full-speed device
//! controller and the SIM clock-gating registers it depends on.
//!
//! No generated peripheral-access crate exists for this part in reach
//! of this workspace, so the registers are addressed the way
//! `rcls-stm-common` and `gd32vf103xx-hal` do it when a PAC is absent:
//! a `#[repr(C)]` struct of `volatile_register` fields reached through
//! a raw pointer at the documented base address, with a `steal()`
//! singleton accessor in the spirit of `avr_device`'s
//! `Peripherals::steal()`. Field names and offsets follow the KL25
//! Sub-Family Reference Manual chapters on SIM and USBOTG.

use volatile_register::{RO, RW};

pub const SIM_BASE: u32 = 0x4004_7000;
pub const USB0_BASE: u32 = 0x4007_2000;

/// System Integration Module registers this part touches: the USB
/// clock gate and the USB clock-source select.
#[repr(C)]
pub struct SimRegisters {
    _reserved0: [u32; 0x1004 / 4],
    pub sopt2: RW<u32>,
    _reserved1: [u32; (0x1034 - 0x1004 - 4) / 4],
    pub scgc4: RW<u32>,
}

impl SimRegisters {
    pub const SCGC4_USBOTG: u32 = 1 << 18;
    pub const SOPT2_USBSRC: u32 = 1 << 18;
    pub const SOPT2_PLLFLLSEL: u32 = 1 << 16;

    /// # Safety
    /// Caller must ensure no other live reference to the SIM block
    /// exists (single owner, established once at `usb_device_init`).
    pub unsafe fn steal() -> &'static Self {
        &*(SIM_BASE as *const Self)
    }
}

/// One `ENDPTn` control register: bits enabling handshake, RX, TX and
/// stall for endpoint `n`.
#[repr(transparent)]
pub struct EndpointCtl(RW<u32>);

impl EndpointCtl {
    pub const EPSTALL: u32 = 1 << 0;
    pub const EPRXEN: u32 = 1 << 3;
    pub const EPTXEN: u32 = 1 << 2;
    pub const EPHSHK: u32 = 1 << 4;

    pub fn write(&self, bits: u32) {
        unsafe { self.0.write(bits) };
    }

    pub fn modify(&self, f: impl FnOnce(u32) -> u32) {
        let current = self.0.read();
        unsafe { self.0.write(f(current)) };
    }
}

/// USB0 full-speed device controller registers.
#[repr(C)]
pub struct Usb0Registers {
    pub perid: RO<u32>,
    pub idcomp: RO<u32>,
    pub rev: RO<u32>,
    pub addinfo: RO<u32>,
    pub otgistat: RW<u32>,
    pub otgicr: RW<u32>,
    pub otgstat: RW<u32>,
    pub otgctl: RW<u32>,
    _reserved0: [u32; (0x80 - 0x20) / 4],
    pub istat: RW<u32>,
    pub inten: RW<u32>,
    pub errstat: RW<u32>,
    pub erren: RW<u32>,
    pub stat: RO<u32>,
    pub ctl: RW<u32>,
    pub addr: RW<u32>,
    pub bdtpage1: RW<u32>,
    pub frmnuml: RO<u32>,
    pub frmnumh: RO<u32>,
    pub token: RW<u32>,
    pub softhld: RW<u32>,
    pub bdtpage2: RW<u32>,
    pub bdtpage3: RW<u32>,
    _reserved1: [u32; (0xC0 - 0xB8) / 4],
    pub endpt: [EndpointCtl; 16],
    pub usbctrl: RW<u32>,
    pub observe: RW<u32>,
    pub control: RW<u32>,
    pub usbtrc0: RW<u32>,
    _reserved2: u32,
    pub usbfrmadjust: RW<u32>,
}

impl Usb0Registers {
    pub const CTL_USBENSOFEN: u32 = 1 << 0;
    pub const CTL_ODDRST: u32 = 1 << 1;
    pub const CTL_RESET: u32 = 1 << 4;

    pub const ISTAT_USBRST: u32 = 1 << 0;
    pub const ISTAT_ERROR: u32 = 1 << 1;
    pub const ISTAT_SOFTOK: u32 = 1 << 2;
    pub const ISTAT_TOKDNE: u32 = 1 << 3;
    pub const ISTAT_SLEEP: u32 = 1 << 4;
    pub const ISTAT_RESUME: u32 = 1 << 5;
    pub const ISTAT_STALL: u32 = 1 << 7;

    pub const INTEN_STANDARD_MASK: u32 = Self::ISTAT_USBRST
        | Self::ISTAT_ERROR
        | Self::ISTAT_SOFTOK
        | Self::ISTAT_TOKDNE
        | Self::ISTAT_SLEEP
        | Self::ISTAT_STALL;

    pub const ADDR_LISTEN: u32 = 1 << 7;

    pub const CONTROL_DPPULLUPNONOTG: u32 = 1 << 4;

    pub const USBTRC0_USBRESET: u32 = 1 << 7;

    /// # Safety
    /// Caller must ensure no other live reference to this block
    /// exists (single owner, established once at `usb_device_init`).
    pub unsafe fn steal() -> &'static Self {
        &*(USB0_BASE as *const Self)
    }

    /// Decode the `STAT` register's transaction-status fields, valid
    /// only immediately after a TOKEN-DONE interrupt, before the next
    /// transaction completes and overwrites it.
    pub fn last_transaction(&self) -> (usize, bool, bool) {
        let stat = self.stat.read();
        let endpoint = ((stat >> 4) & 0xF) as usize;
        let tx = (stat & 0x08) != 0;
        let odd = (stat & 0x04) != 0;
        (endpoint, tx, odd)
    }
}
