#![cfg_attr(target_arch = "arm", no_std)]
#![cfg_attr(target_arch = "arm", no_main)]

// The runtime/logging-transport/panic crates this binary links against
// (see firmware/Cargo.toml) are only available on the ARM target, so
// the actual on-target entry point is gated the same way; a host build
// of `cargo build`/`cargo test` never needs any of this and gets a
// trivial stand-in `main` instead.
#[cfg(target_arch = "arm")]
mod on_target {

use cortex_m_rt::entry;
use defmt_rtt as _;
use panic_probe as _;

use hidbridge::engine::Engine;
use hidbridge::hooks::EngineHooks;
use hidbridge::isr;
use hidbridge::pac::{SimRegisters, Usb0Registers};

/// `NVIC_ISER0`. No PAC interrupt enum exists for this part, and
/// `cortex_m::peripheral::NVIC::unmask` takes an enum implementing
/// `InterruptNumber` rather than a bare `u8`, so the set-enable
/// register is written directly instead.
const NVIC_ISER0: *mut u32 = 0xE000_E100 as *mut u32;

struct BlinkHooks;

impl EngineHooks for BlinkHooks {
    fn on_rx_activity(&self, on: bool) {
        defmt::trace!("rx activity: {=bool}", on);
    }

    fn on_tx_activity(&self, on: bool) {
        defmt::trace!("tx activity: {=bool}", on);
    }

    fn on_message_packet(&self, payload: &[u8]) {
        defmt::info!("oob message: {=[u8]}", payload);
    }
}

static HOOKS: BlinkHooks = BlinkHooks;
static mut ENGINE: Engine = Engine::new();

/// Bring up the USB peripheral: select its clock source, gate its
/// clock on, cycle its soft reset, program the BDT base, clear
/// pending flags, arm the bus-reset interrupt, assert the D+ pull-up,
/// and unmask the line at the NVIC.
fn usb_device_init(engine: &'static mut Engine, sim: &SimRegisters, usb: &Usb0Registers) {
    unsafe {
        sim.sopt2.modify(|bits| bits | SimRegisters::SOPT2_PLLFLLSEL | SimRegisters::SOPT2_USBSRC);
        sim.scgc4.modify(|bits| bits | SimRegisters::SCGC4_USBOTG);

        usb.usbtrc0.modify(|bits| bits | Usb0Registers::USBTRC0_USBRESET);
        while usb.usbtrc0.read() & Usb0Registers::USBTRC0_USBRESET != 0 {}

        let base = engine.bdt_base_address();
        usb.bdtpage1.write((base >> 8) & 0xFF);
        usb.bdtpage2.write((base >> 16) & 0xFF);
        usb.bdtpage3.write((base >> 24) & 0xFF);

        usb.istat.write(0xFF);
        usb.errstat.write(0xFF);

        // Undocumented bit required for reliable operation on this
        // part; distinct from the soft-reset bit written above.
        usb.usbtrc0.modify(|bits| bits | 0x40);

        usb.inten.write(Usb0Registers::ISTAT_USBRST);

        usb.ctl.write(Usb0Registers::CTL_USBENSOFEN);
        usb.control.write(Usb0Registers::CONTROL_DPPULLUPNONOTG);

        // The peripheral's own INTEN arms its interrupt sources, but
        // the core never takes the exception until the NVIC also
        // unmasks the line.
        NVIC_ISER0.write_volatile(1u32 << usb0_irq_number() as u32);
    }

    engine.set_hooks(&HOOKS);
}

#[entry]
fn main() -> ! {
    defmt::info!("hidbridge: boot");

    let sim = unsafe { SimRegisters::steal() };
    let usb = unsafe { Usb0Registers::steal() };

    #[allow(static_mut_refs)]
    let engine = unsafe { &mut ENGINE };
    usb_device_init(engine, sim, usb);

    loop {
        cortex_m::asm::wfi();
    }
}

#[cortex_m_rt::exception]
unsafe fn DefaultHandler(irqn: i16) {
    if irqn == usb0_irq_number() {
        let usb = Usb0Registers::steal();
        #[allow(static_mut_refs)]
        let engine = &mut ENGINE;
        isr::service(engine, usb);
    }
}

/// KL25Z's USB0 interrupt sits at external interrupt number 22 in the
/// NVIC vector table (Kinetis KL25 Sub-Family Reference Manual, Table
/// 3-6). `cortex-m-rt`'s `#[interrupt]` attribute requires a generated
/// PAC enum this part does not have, so the vector is routed through
/// `DefaultHandler` and matched on `irqn` instead.
const fn usb0_irq_number() -> i16 {
    22
}

} // mod on_target

#[cfg(not(target_arch = "arm"))]
fn main() {}
