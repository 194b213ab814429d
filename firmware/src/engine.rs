//! The single logical engine instance (§9 Design Notes: "Global state
//! → explicit engine value"). Bundles the BDT, both pipe state
//! machines, the stream FIFOs, the durable EP1 TX bank storage, the
//! registered hook object and the error counters that the original
//! firmware kept as a scatter of module-level statics.
//!
//! Exactly one `Engine` is ever live — the USB peripheral is a
//! hardware singleton — but nothing here enforces that beyond
//! convention; `main.rs` owns the one instance and reaches it from
//! the interrupt vector via a `static mut`, the same pattern the
//! teacher crate uses for its own globally-shared peripheral handle.

use crate::bdt::Bdt;
use crate::config::{Config, ENDPOINT_BUF_SIZE, FIFO_CAPACITY};
use crate::ep0::ControlPipe;
use crate::ep1::{StreamPipe, TxBanks, EP1};
use crate::errors::ErrorCounters;
use crate::fifo::ByteFifo;
use crate::hooks::{EngineHooks, NoopHooks};

pub struct Engine<const TX_CAP: usize = FIFO_CAPACITY, const RX_CAP: usize = FIFO_CAPACITY> {
    pub(crate) bdt: Bdt,
    pub(crate) ep0: ControlPipe,
    pub(crate) ep1: StreamPipe<TX_CAP, RX_CAP>,
    pub(crate) tx_fifo: ByteFifo<TX_CAP>,
    pub(crate) rx_fifo: ByteFifo<RX_CAP>,
    pub(crate) ep0_rx: [[u8; ENDPOINT_BUF_SIZE]; 2],
    pub(crate) ep1_rx: [[u8; ENDPOINT_BUF_SIZE]; 2],
    pub(crate) ep1_tx: TxBanks,
    hooks: &'static dyn EngineHooks,
    counters: ErrorCounters,
}

impl<const TX_CAP: usize, const RX_CAP: usize> Engine<TX_CAP, RX_CAP> {
    pub const fn new() -> Self {
        Self {
            bdt: Bdt::new(),
            ep0: ControlPipe::new(),
            ep1: StreamPipe::new(),
            tx_fifo: ByteFifo::new(),
            rx_fifo: ByteFifo::new(),
            ep0_rx: [[0; ENDPOINT_BUF_SIZE]; 2],
            ep1_rx: [[0; ENDPOINT_BUF_SIZE]; 2],
            ep1_tx: [[0; ENDPOINT_BUF_SIZE]; 2],
            hooks: &NoopHooks,
            counters: ErrorCounters::new(),
        }
    }

    /// Register the application's activity/message hooks. Call once,
    /// before interrupts are enabled.
    pub fn set_hooks(&mut self, hooks: &'static dyn EngineHooks) {
        self.hooks = hooks;
    }

    pub(crate) fn hooks(&self) -> &'static dyn EngineHooks {
        self.hooks
    }

    pub(crate) fn counters_mut(&mut self) -> &mut ErrorCounters {
        &mut self.counters
    }

    pub fn error_counters(&self) -> ErrorCounters {
        self.counters
    }

    pub fn config(&self) -> Config {
        Config::new().with_fifo_capacity(TX_CAP)
    }

    /// Reset all engine-owned state back to its just-booted shape:
    /// both endpoints re-initialized, both control pipes idle. FIFOs
    /// are deliberately left untouched — a bus reset does not drain
    /// application data per §5.
    pub(crate) fn reinit_endpoints(&mut self) {
        self.bdt.init_endpoint(crate::ep0::EP0, &mut self.ep0_rx);
        self.bdt.init_endpoint(EP1, &mut self.ep1_rx);
        self.ep0.reset();
    }

    /// `usb_send_message_packet`: queue an out-of-band message. Fails
    /// (and bumps the rejection counter) if the OOB slot is busy.
    pub fn send_message_packet(&mut self, data: &[u8]) -> bool {
        if self.ep1.send_message_packet(data) {
            true
        } else {
            self.counters.note_oob_busy_rejection();
            false
        }
    }

    /// Push one byte into the outgoing stream. Returns `false` (and
    /// bumps the rejection counter) if the TX FIFO is full.
    pub fn push_tx_byte(&mut self, byte: u8) -> bool {
        if self.tx_fifo.push(byte) {
            true
        } else {
            self.counters.note_tx_fifo_full_rejection();
            false
        }
    }

    /// Pop one byte the device has received from the host.
    pub fn pop_rx_byte(&mut self) -> Option<u8> {
        self.rx_fifo.pop()
    }

    pub fn rx_available(&self) -> usize {
        self.rx_fifo.size()
    }

    pub fn tx_free(&self) -> usize {
        self.tx_fifo.capacity() - self.tx_fifo.size()
    }

    /// Address to program into the peripheral's `BDTPAGE1..3`
    /// registers during `usb_device_init`.
    pub fn bdt_base_address(&self) -> u32 {
        self.bdt.base_address()
    }
}

impl<const TX_CAP: usize, const RX_CAP: usize> Default for Engine<TX_CAP, RX_CAP> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_tx_byte_rejects_when_full_and_counts_it() {
        let mut engine: Engine<2, 2> = Engine::new();
        assert!(engine.push_tx_byte(1));
        assert!(!engine.push_tx_byte(2), "capacity 2 fifo only ever admits 1 byte (full/empty alias)");
        assert_eq!(engine.error_counters().tx_fifo_full_rejections, 1);
    }

    #[test]
    fn send_message_packet_rejects_when_oob_slot_busy() {
        let mut engine: Engine<64, 64> = Engine::new();
        assert!(engine.send_message_packet(&[1, 2, 3]));
        assert!(!engine.send_message_packet(&[4, 5, 6]));
        assert_eq!(engine.error_counters().oob_busy_rejections, 1);
    }
}
