//! Endpoint-0 control-transfer state machine: SETUP/IN/OUT phases,
//! descriptor delivery, SET_ADDRESS, SET_CONFIGURATION and stall.

use crate::bdt::{Bdt, ENDPOINT_BUF_SIZE};
use crate::descriptors;

pub const EP0: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub bm_request_type: u8,
    pub b_request: u8,
    pub w_value: u16,
    pub w_index: u16,
    pub w_length: u16,
}

impl SetupPacket {
    /// Copy a SETUP packet out of a raw 8-byte RX buffer, by value —
    /// the buffer it came from is volatile peripheral memory that may
    /// be reused the moment this function returns.
    pub fn from_bytes(raw: &[u8; 8]) -> Self {
        Self {
            bm_request_type: raw[0],
            b_request: raw[1],
            w_value: u16::from_le_bytes([raw[2], raw[3]]),
            w_index: u16::from_le_bytes([raw[4], raw[5]]),
            w_length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    fn request_and_type(&self) -> u16 {
        ((self.bm_request_type as u16) << 8) | self.b_request as u16
    }
}

/// What the ISR dispatcher must do to the peripheral's EP0 control
/// register as a result of processing a SETUP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Unsupported or malformed request: assert STALL.
    Stall,
    /// A response (possibly zero-length) has already been armed.
    Responded,
}

/// The three states the control pipe can be in between interrupts,
/// per the EP0 carry-over design note: remembers the SETUP-time
/// decision across the IN tokens that deliver (or await) its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetupState {
    Idle,
    Sending {
        remaining: &'static [u8],
        last_chunk_was_full: bool,
    },
    AwaitingAddressStatus {
        address: u8,
    },
}

pub struct ControlPipe {
    state: SetupState,
}

impl ControlPipe {
    pub const fn new() -> Self {
        Self {
            state: SetupState::Idle,
        }
    }

    pub fn reset(&mut self) {
        self.state = SetupState::Idle;
    }

    /// Arm one ≤64-byte chunk from `remaining` and compute the
    /// resulting carry-over state. A multiple-of-64 payload that is
    /// now fully delivered leaves `last_chunk_was_full` set so the
    /// *next* call arms a zero-length packet, terminating the data
    /// stage as USB requires.
    fn advance(bdt: &mut Bdt, remaining: &'static [u8]) -> SetupState {
        let chunk_len = core::cmp::min(remaining.len(), ENDPOINT_BUF_SIZE as usize);
        let (chunk, rest) = remaining.split_at(chunk_len);
        bdt.arm_tx(EP0, chunk.as_ptr() as u32, chunk_len as u16);
        let was_full = chunk_len == ENDPOINT_BUF_SIZE as usize;
        if rest.is_empty() && !was_full {
            SetupState::Idle
        } else {
            SetupState::Sending {
                remaining: rest,
                last_chunk_was_full: was_full,
            }
        }
    }

    /// Handle a SETUP token. `bdt` must already have had its EP0 TX
    /// descriptors forcibly cleared and DATA1 reset by the caller
    /// (invariant: every SETUP discards any pending IN data) — the
    /// dispatcher does this before calling in, since it owns the raw
    /// RX buffer the packet is copied out of.
    pub fn handle_setup(&mut self, bdt: &mut Bdt, setup: SetupPacket) -> SetupOutcome {
        self.state = SetupState::Idle;

        match setup.request_and_type() {
            0x0500 => {
                // SET_ADDRESS: ack with a ZLP now, latch the address
                // once that status IN actually completes.
                self.state = Self::advance(bdt, &[]);
                self.state = SetupState::AwaitingAddressStatus {
                    address: setup.w_value as u8,
                };
                SetupOutcome::Responded
            }
            0x0900 => {
                // SET_CONFIGURATION: only one configuration exists.
                self.state = Self::advance(bdt, &[]);
                SetupOutcome::Responded
            }
            0x0680 | 0x0681 => match descriptors::lookup(setup.w_value, setup.w_index) {
                Some(bytes) => {
                    let len = core::cmp::min(bytes.len(), setup.w_length as usize);
                    let payload = &bytes[..len];
                    let first = Self::advance(bdt, payload);
                    self.state = match first {
                        SetupState::Sending { remaining, .. } => Self::advance(bdt, remaining),
                        idle => idle,
                    };
                    SetupOutcome::Responded
                }
                None => SetupOutcome::Stall,
            },
            _ => SetupOutcome::Stall,
        }
    }

    /// Handle an IN token on EP0. Returns the device address to latch
    /// if a pending SET_ADDRESS's status stage just completed.
    pub fn handle_in(&mut self, bdt: &mut Bdt) -> Option<u8> {
        match self.state {
            SetupState::Sending { remaining, .. } => {
                self.state = Self::advance(bdt, remaining);
                None
            }
            SetupState::AwaitingAddressStatus { address } => {
                self.state = SetupState::Idle;
                Some(address)
            }
            SetupState::Idle => None,
        }
    }

    /// OUT and SOF tokens on EP0 complete the status stage of
    /// OUT-type control transfers, which this part never initiates;
    /// nothing beyond the hardware handshake is required.
    pub fn handle_out(&mut self) {}
}

impl Default for ControlPipe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdt::{Bank, Direction};

    fn rx_buf() -> [[u8; ENDPOINT_BUF_SIZE as usize]; 2] {
        [[0u8; ENDPOINT_BUF_SIZE as usize]; 2]
    }

    fn new_bdt() -> Bdt {
        let mut bdt = Bdt::new();
        bdt.init_endpoint(EP0, &mut rx_buf());
        bdt
    }

    #[test]
    fn get_device_descriptor_sends_one_data1_packet() {
        let mut bdt = new_bdt();
        let mut pipe = ControlPipe::new();
        bdt.clear_tx_and_reset_data1(EP0);

        let setup = SetupPacket {
            bm_request_type: 0x80,
            b_request: 0x06,
            w_value: 0x0100,
            w_index: 0x0000,
            w_length: 0x0040,
        };
        let outcome = pipe.handle_setup(&mut bdt, setup);
        assert_eq!(outcome, SetupOutcome::Responded);

        let bd = bdt.descriptor_ref(EP0, Direction::Tx, Bank::Even);
        assert!(bd.is_peripheral_owned());
        assert!(bd.data1(), "first data-stage packet after SETUP is DATA1");
        assert_eq!(bd.byte_count(), 18);
    }

    #[test]
    fn set_address_latches_only_after_status_in_completes() {
        let mut bdt = new_bdt();
        let mut pipe = ControlPipe::new();
        bdt.clear_tx_and_reset_data1(EP0);

        let setup = SetupPacket {
            bm_request_type: 0x00,
            b_request: 0x05,
            w_value: 7,
            w_index: 0,
            w_length: 0,
        };
        pipe.handle_setup(&mut bdt, setup);
        let bd = bdt.descriptor_ref(EP0, Direction::Tx, Bank::Even);
        assert_eq!(bd.byte_count(), 0, "ack is a zero-length packet");

        assert_eq!(pipe.handle_in(&mut bdt), Some(7));
        assert_eq!(pipe.handle_in(&mut bdt), None);
    }

    #[test]
    fn unsupported_request_stalls() {
        let mut bdt = new_bdt();
        let mut pipe = ControlPipe::new();
        bdt.clear_tx_and_reset_data1(EP0);

        let setup = SetupPacket {
            bm_request_type: 0x21,
            b_request: 0x0A, // SET_IDLE
            w_value: 0,
            w_index: 0,
            w_length: 0,
        };
        assert_eq!(pipe.handle_setup(&mut bdt, setup), SetupOutcome::Stall);
    }

    #[test]
    fn descriptor_miss_stalls() {
        let mut bdt = new_bdt();
        let mut pipe = ControlPipe::new();
        bdt.clear_tx_and_reset_data1(EP0);

        let setup = SetupPacket {
            bm_request_type: 0x80,
            b_request: 0x06,
            w_value: 0x0301,
            w_index: 0x1234, // no matching wIndex
            w_length: 64,
        };
        assert_eq!(pipe.handle_setup(&mut bdt, setup), SetupOutcome::Stall);
    }

    #[test]
    fn exact_multiple_of_64_response_ends_with_a_zero_length_packet() {
        let mut bdt = new_bdt();
        let mut pipe = ControlPipe::new();
        bdt.clear_tx_and_reset_data1(EP0);

        // Force a 64-byte config descriptor request window by asking
        // for exactly the report descriptor length padded — instead,
        // directly exercise `advance` semantics via two chained calls
        // using a synthetic 64-byte payload.
        static PAYLOAD: [u8; 64] = [0xAB; 64];
        let state_after_first = ControlPipe::advance(&mut bdt, &PAYLOAD);
        match state_after_first {
            SetupState::Sending {
                remaining,
                last_chunk_was_full,
            } => {
                assert!(remaining.is_empty());
                assert!(last_chunk_was_full);
                pipe.state = state_after_first;
            }
            _ => panic!("expected a pending ZLP continuation"),
        }

        assert_eq!(pipe.handle_in(&mut bdt), None);
        let bd = bdt.descriptor_ref(EP0, Direction::Tx, Bank::Odd);
        assert_eq!(bd.byte_count(), 0);
    }
}
