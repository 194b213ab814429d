//! Endpoint-1 stream-over-HID protocol: report packing/unpacking, the
//! RX/TX byte FIFOs, and the out-of-band message channel.

use crate::bdt::{Bdt, ENDPOINT_BUF_SIZE};
use crate::fifo::ByteFifo;

pub const EP1: usize = 1;
pub const OOB_MAGIC: u8 = 0xFF;
const HEADER_LEN: usize = 1;
const MAX_PAYLOAD: usize = ENDPOINT_BUF_SIZE as usize - HEADER_LEN;

pub type TxBanks = [[u8; ENDPOINT_BUF_SIZE as usize]; 2];

/// Out-of-band message slot lifecycle: a linear cycle with no other
/// transitions — FREE -(enqueue)-> QUEUED -(arm TX)-> TRANSMITTING
/// -(TX complete)-> FREE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OobState {
    Free,
    Queued,
    Transmitting,
}

pub struct OobSlot {
    state: OobState,
    buffer: [u8; ENDPOINT_BUF_SIZE as usize],
}

impl OobSlot {
    pub const fn new() -> Self {
        Self {
            state: OobState::Free,
            buffer: [0u8; ENDPOINT_BUF_SIZE as usize],
        }
    }

    /// Copy up to 63 bytes into the slot and mark it QUEUED. Returns
    /// `false` (leaving the slot untouched) unless it was FREE.
    pub fn enqueue(&mut self, data: &[u8]) -> bool {
        if self.state != OobState::Free {
            return false;
        }
        let len = core::cmp::min(data.len(), MAX_PAYLOAD);
        self.buffer[0] = OOB_MAGIC;
        self.buffer[1..1 + len].copy_from_slice(&data[..len]);
        for b in &mut self.buffer[1 + len..] {
            *b = 0;
        }
        self.state = OobState::Queued;
        true
    }

    fn take_for_transmission(&mut self) -> Option<&[u8; ENDPOINT_BUF_SIZE as usize]> {
        if self.state == OobState::Queued {
            self.state = OobState::Transmitting;
            Some(&self.buffer)
        } else {
            None
        }
    }

    fn note_tx_complete(&mut self, sent_payload_size_byte: u8) {
        if self.state == OobState::Transmitting && sent_payload_size_byte == OOB_MAGIC {
            self.state = OobState::Free;
        }
    }

    #[cfg(test)]
    fn is_free(&self) -> bool {
        self.state == OobState::Free
    }
}

impl Default for OobSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of processing a TOK_OUT completion, for the dispatcher to
/// turn into activity-hook and OOB-hook calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxOutcome {
    Stream,
    OutOfBand,
    Ignored,
}

pub struct StreamPipe<const TX_CAP: usize, const RX_CAP: usize> {
    oob: OobSlot,
}

impl<const TX_CAP: usize, const RX_CAP: usize> StreamPipe<TX_CAP, RX_CAP> {
    pub const fn new() -> Self {
        Self {
            oob: OobSlot::new(),
        }
    }

    pub fn send_message_packet(&mut self, data: &[u8]) -> bool {
        self.oob.enqueue(data)
    }

    #[cfg(test)]
    pub fn oob_is_free(&self) -> bool {
        self.oob.is_free()
    }

    /// IN (transmit) policy: attempted only when the next TX BD is
    /// free. OOB messages take priority over queued stream data.
    /// Returns `true` if a transmission was armed.
    pub fn poll_tx(&mut self, bdt: &mut Bdt, tx_buffers: &mut TxBanks, tx_fifo: &ByteFifo<TX_CAP>) -> bool {
        if !bdt.tx_descriptor_free(EP1) {
            return false;
        }

        if let Some(packet) = self.oob.take_for_transmission() {
            bdt.arm_tx(EP1, packet.as_ptr() as u32, ENDPOINT_BUF_SIZE);
            return true;
        }

        if tx_fifo.is_empty() {
            return false;
        }

        let bank = bdt.next_tx_bank(EP1) as usize;
        let report = &mut tx_buffers[bank];
        let mut drained = 0usize;
        while drained < MAX_PAYLOAD {
            match tx_fifo.pop() {
                Some(byte) => {
                    report[1 + drained] = byte;
                    drained += 1;
                }
                None => break,
            }
        }
        report[0] = drained as u8;

        // Always arm a full 64-byte transmission — carrying the real
        // length inside the payload instead — because the generic
        // HID host driver this part targets misbehaves on short
        // reports.
        bdt.arm_tx(EP1, report.as_ptr() as u32, ENDPOINT_BUF_SIZE);
        true
    }

    /// Inspect a completed TX bank's payload-size byte: if it carries
    /// the OOB magic, free the OOB slot. Then re-attempt the IN
    /// policy so a waiting bank gets filled immediately.
    pub fn on_tx_complete(
        &mut self,
        bdt: &mut Bdt,
        tx_buffers: &mut TxBanks,
        tx_fifo: &ByteFifo<TX_CAP>,
        sent_payload_size_byte: u8,
    ) {
        self.oob.note_tx_complete(sent_payload_size_byte);
        self.poll_tx(bdt, tx_buffers, tx_fifo);
    }

    /// OUT (receive) policy: read payload-size from the just-returned
    /// RX bank and route the payload to the stream FIFO or the OOB
    /// hook, or discard it if the size is reserved/invalid.
    pub fn on_rx_complete(
        &mut self,
        rx_fifo: &ByteFifo<RX_CAP>,
        received_bytes: u16,
        report: &[u8; ENDPOINT_BUF_SIZE as usize],
        mut deliver_oob: impl FnMut(&[u8]),
    ) -> RxOutcome {
        if received_bytes < HEADER_LEN as u16 {
            return RxOutcome::Ignored;
        }
        let payload_size = report[0];
        let max_payload_in_packet = received_bytes as usize - HEADER_LEN;

        if payload_size as usize <= max_payload_in_packet && payload_size as usize <= MAX_PAYLOAD - 1 {
            for &byte in &report[1..1 + payload_size as usize] {
                rx_fifo.push(byte); // overflow silently drops the byte
            }
            RxOutcome::Stream
        } else if payload_size == OOB_MAGIC {
            deliver_oob(&report[1..ENDPOINT_BUF_SIZE as usize]);
            RxOutcome::OutOfBand
        } else {
            RxOutcome::Ignored
        }
    }
}

impl<const TX_CAP: usize, const RX_CAP: usize> Default for StreamPipe<TX_CAP, RX_CAP> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdt::Direction;

    fn new_bdt() -> Bdt {
        let mut bdt = Bdt::new();
        let mut rx = [[0u8; ENDPOINT_BUF_SIZE as usize]; 2];
        bdt.init_endpoint(EP1, &mut rx);
        bdt
    }

    #[test]
    fn stream_echo_round_trips_through_both_fifos() {
        let mut bdt = new_bdt();
        let mut pipe: StreamPipe<512, 512> = StreamPipe::new();
        let rx_fifo: ByteFifo<512> = ByteFifo::new();
        let tx_fifo: ByteFifo<512> = ByteFifo::new();
        let mut tx_banks: TxBanks = [[0; ENDPOINT_BUF_SIZE as usize]; 2];

        let mut incoming = [0u8; ENDPOINT_BUF_SIZE as usize];
        incoming[0] = 5;
        incoming[1..6].copy_from_slice(b"Hello");

        let outcome = pipe.on_rx_complete(&rx_fifo, ENDPOINT_BUF_SIZE, &incoming, |_| {
            panic!("stream report must not hit the OOB hook")
        });
        assert_eq!(outcome, RxOutcome::Stream);
        assert_eq!(rx_fifo.size(), 5);

        for b in b"Hello" {
            tx_fifo.push(*b);
        }
        assert!(pipe.poll_tx(&mut bdt, &mut tx_banks, &tx_fifo));
        let armed_bank = !bdt.next_tx_bank(EP1); // poll_tx already flipped it
        let report = &tx_banks[armed_bank as usize];
        assert_eq!(report[0], 5);
        assert_eq!(&report[1..6], b"Hello");
    }

    #[test]
    fn oob_message_takes_priority_over_queued_stream_bytes() {
        let mut bdt = new_bdt();
        let mut pipe: StreamPipe<512, 512> = StreamPipe::new();
        let tx_fifo: ByteFifo<512> = ByteFifo::new();
        let mut tx_banks: TxBanks = [[0; ENDPOINT_BUF_SIZE as usize]; 2];

        for _ in 0..10u8 {
            tx_fifo.push(0x55);
        }
        assert!(pipe.send_message_packet(&[0xAA, 0xBB]));

        assert!(pipe.poll_tx(&mut bdt, &mut tx_banks, &tx_fifo));
        // OOB armed first: the bank it used carries the magic byte.
        let used = !bdt.next_tx_bank(EP1);
        assert_eq!(tx_banks[used as usize][0], OOB_MAGIC);
        assert_eq!(tx_banks[used as usize][1], 0xAA);
        assert_eq!(tx_banks[used as usize][2], 0xBB);
        assert_eq!(tx_fifo.size(), 10, "stream bytes remain queued behind the OOB packet");

        // Free the other bank so the stream bytes can go out next.
        bdt.descriptor(EP1, Direction::Tx, !used).clear();
        assert!(pipe.poll_tx(&mut bdt, &mut tx_banks, &tx_fifo));
        let second = !bdt.next_tx_bank(EP1);
        assert_eq!(tx_banks[second as usize][0], 10);
    }

    #[test]
    fn tx_completion_frees_oob_slot_only_for_the_oob_bank() {
        let mut bdt = new_bdt();
        let mut pipe: StreamPipe<512, 512> = StreamPipe::new();
        let tx_fifo: ByteFifo<512> = ByteFifo::new();
        let mut tx_banks: TxBanks = [[0; ENDPOINT_BUF_SIZE as usize]; 2];

        pipe.send_message_packet(&[1, 2, 3]);
        pipe.poll_tx(&mut bdt, &mut tx_banks, &tx_fifo);
        assert!(!pipe.oob_is_free());

        pipe.on_tx_complete(&mut bdt, &mut tx_banks, &tx_fifo, OOB_MAGIC);
        assert!(pipe.oob_is_free());
    }

    #[test]
    fn reserved_payload_size_is_discarded() {
        let rx_fifo: ByteFifo<512> = ByteFifo::new();
        let mut pipe: StreamPipe<512, 512> = StreamPipe::new();
        let mut incoming = [0u8; ENDPOINT_BUF_SIZE as usize];
        incoming[0] = 200; // reserved: not <=62, not 0xFF
        let outcome = pipe.on_rx_complete(&rx_fifo, ENDPOINT_BUF_SIZE, &incoming, |_| {
            panic!("reserved size must not reach the OOB hook")
        });
        assert_eq!(outcome, RxOutcome::Ignored);
        assert_eq!(rx_fifo.size(), 0);
    }
}
