//! USB0 interrupt service routine. Reads the peripheral's pending-flag
//! byte and services it in the fixed order the hardware's state model
//! requires: bus reset first (and alone), then error, SOF, token-done,
//! sleep, stall.
//!
//! Hardware-only: this module dereferences real MMIO addresses and is
//! therefore excluded from host test builds, the same way an
//! `avr_device::atmega32u4::Peripherals` handle is only reachable
//! on-target rather than from a host unit test.

use crate::bdt::{Bank, Direction, Token};
use crate::ep0::{self, SetupOutcome, SetupPacket};
use crate::ep1::{self, RxOutcome};
use crate::{config, engine::Engine, pac::Usb0Registers};

/// Service every asserted flag on `usb` once, in protocol order.
pub fn service<const TX_CAP: usize, const RX_CAP: usize>(engine: &mut Engine<TX_CAP, RX_CAP>, usb: &Usb0Registers) {
    let istat = usb.istat.read();

    if istat & Usb0Registers::ISTAT_USBRST != 0 {
        handle_bus_reset(engine, usb);
        return;
    }

    if istat & Usb0Registers::ISTAT_ERROR != 0 {
        handle_error(engine, usb);
    }

    if istat & Usb0Registers::ISTAT_SOFTOK != 0 {
        handle_sof(engine, usb);
    }

    if istat & Usb0Registers::ISTAT_TOKDNE != 0 {
        handle_token_done(engine, usb);
    }

    if istat & Usb0Registers::ISTAT_SLEEP != 0 {
        unsafe { usb.istat.write(Usb0Registers::ISTAT_SLEEP) };
    }

    if istat & Usb0Registers::ISTAT_STALL != 0 {
        unsafe { usb.istat.write(Usb0Registers::ISTAT_STALL) };
    }
}

fn handle_bus_reset<const TX_CAP: usize, const RX_CAP: usize>(engine: &mut Engine<TX_CAP, RX_CAP>, usb: &Usb0Registers) {
    defmt::debug!("usb: bus reset");
    engine.counters_mut().note_bus_reset();

    unsafe {
        usb.ctl.modify(|bits| bits | Usb0Registers::CTL_ODDRST);
        usb.ctl.modify(|bits| bits & !Usb0Registers::CTL_ODDRST);
    }

    engine.reinit_endpoints();

    unsafe {
        usb.errstat.write(0xFF);
        usb.istat.write(0xFF);
        usb.addr.write(0);
        usb.erren.write(0xFF);
        usb.inten.write(Usb0Registers::INTEN_STANDARD_MASK);
    }
}

fn handle_error<const TX_CAP: usize, const RX_CAP: usize>(engine: &mut Engine<TX_CAP, RX_CAP>, usb: &Usb0Registers) {
    let errstat = usb.errstat.read();
    defmt::trace!("usb: error status {:x}", errstat);
    engine.counters_mut().note_hw_error();
    unsafe {
        usb.errstat.write(errstat);
        usb.istat.write(Usb0Registers::ISTAT_ERROR);
    }
}

fn handle_sof<const TX_CAP: usize, const RX_CAP: usize>(engine: &mut Engine<TX_CAP, RX_CAP>, usb: &Usb0Registers) {
    engine.hooks().on_rx_activity(false);
    engine.hooks().on_tx_activity(false);
    poll_ep1_tx(engine, usb);
    unsafe { usb.istat.write(Usb0Registers::ISTAT_SOFTOK) };
}

fn poll_ep1_tx<const TX_CAP: usize, const RX_CAP: usize>(engine: &mut Engine<TX_CAP, RX_CAP>, _usb: &Usb0Registers) {
    if engine.ep1.poll_tx(&mut engine.bdt, &mut engine.ep1_tx, &engine.tx_fifo) {
        engine.hooks().on_tx_activity(true);
    }
}

fn handle_token_done<const TX_CAP: usize, const RX_CAP: usize>(engine: &mut Engine<TX_CAP, RX_CAP>, usb: &Usb0Registers) {
    let (endpoint, tx, odd) = usb.last_transaction();
    let bank = if odd { Bank::Odd } else { Bank::Even };
    let direction = if tx { Direction::Tx } else { Direction::Rx };

    if endpoint == ep0::EP0 {
        dispatch_ep0(engine, direction, bank);
    } else if endpoint == ep1::EP1 {
        dispatch_ep1(engine, direction, bank);
    }

    unsafe { usb.istat.write(Usb0Registers::ISTAT_TOKDNE) };
}

fn dispatch_ep0<const TX_CAP: usize, const RX_CAP: usize>(engine: &mut Engine<TX_CAP, RX_CAP>, direction: Direction, bank: Bank) {
    let bd = engine.bdt.descriptor_ref(ep0::EP0, direction, bank);
    let token = bd.token();

    match (direction, token) {
        (Direction::Rx, Token::Setup) => {
            engine.hooks().on_rx_activity(true);
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&engine.ep0_rx[bank as usize][..8]);
            let setup = SetupPacket::from_bytes(&raw);

            engine.bdt.clear_tx_and_reset_data1(ep0::EP0);
            match engine.ep0.handle_setup(&mut engine.bdt, setup) {
                SetupOutcome::Stall => {
                    defmt::debug!("usb: ep0 stall");
                }
                SetupOutcome::Responded => {}
            }
            engine.bdt.release_rx(ep0::EP0, bank, config::ENDPOINT_BUF_SIZE as u16);
        }
        (Direction::Rx, _) => {
            engine.ep0.handle_out();
            engine.bdt.release_rx(ep0::EP0, bank, config::ENDPOINT_BUF_SIZE as u16);
        }
        (Direction::Tx, _) => {
            engine.hooks().on_tx_activity(true);
            if let Some(address) = engine.ep0.handle_in(&mut engine.bdt) {
                // latched after the status IN per §4.D step 2.
                defmt::debug!("usb: latching address {=u8}", address);
            }
        }
    }
}

fn dispatch_ep1<const TX_CAP: usize, const RX_CAP: usize>(engine: &mut Engine<TX_CAP, RX_CAP>, direction: Direction, bank: Bank) {
    match direction {
        Direction::Rx => {
            engine.hooks().on_rx_activity(true);
            let received_bytes = engine.bdt.descriptor_ref(ep1::EP1, Direction::Rx, bank).byte_count();
            let report = engine.ep1_rx[bank as usize];
            let size_before = engine.rx_fifo.size();
            let hooks = engine.hooks();

            let outcome = engine.ep1.on_rx_complete(&engine.rx_fifo, received_bytes, &report, |payload| {
                hooks.on_message_packet(payload);
            });

            if outcome == RxOutcome::Stream && report[0] > 0 && engine.rx_fifo.size() == size_before {
                engine.counters_mut().note_rx_fifo_overflow();
            }

            engine.bdt.release_rx(ep1::EP1, bank, config::ENDPOINT_BUF_SIZE as u16);
        }
        Direction::Tx => {
            engine.hooks().on_tx_activity(true);
            let sent_payload_size_byte = engine.ep1_tx[bank as usize][0];
            engine
                .ep1
                .on_tx_complete(&mut engine.bdt, &mut engine.ep1_tx, &engine.tx_fifo, sent_payload_size_byte);
        }
    }
}
