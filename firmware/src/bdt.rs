//! Buffer Descriptor Table and the endpoint "ping-pong" data plane.
//!
//! The BDT is memory shared with the USB peripheral's DMA engine: the
//! OWN bit of each [`BufferDescriptor`] selects whether software or
//! the peripheral may touch the rest of that descriptor's fields (and
//! transitively the buffer it points at). Every write that hands a
//! descriptor to the peripheral must publish `addr` and the byte
//! count before the OWN bit, which is why the arm/release primitives
//! below issue a `cortex_m::asm::dmb()` ahead of the final store.

use volatile_register::RW;

/// `cortex_m::asm::dmb()` only links on the ARM target (it calls out
/// to a precompiled blob with no x86_64 counterpart); the host build
/// that exercises this module's `#[cfg(test)]` suites has no hardware
/// to order writes against, so it gets a no-op stand-in instead.
#[cfg(target_arch = "arm")]
use cortex_m::asm::dmb;
#[cfg(not(target_arch = "arm"))]
fn dmb() {}

pub const ENDPOINT_BUF_SIZE: u16 = 64;
pub const USB_NUM_ENDPOINTS: usize = 2;

const BD_BC_SHIFT: u32 = 16;
const BD_OWN_MASK: u32 = 1 << 7;
const BD_DATA1_MASK: u32 = 1 << 6;
const BD_DTS_MASK: u32 = 1 << 3;
const BD_STALL_MASK: u32 = 1 << 2;
const BD_TOK_SHIFT: u32 = 2;
const BD_TOK_MASK: u32 = 0xF << BD_TOK_SHIFT;

/// Token codes the peripheral leaves in a completed BD's `desc` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Out,
    In,
    Sof,
    Setup,
    Other(u8),
}

impl Token {
    fn from_code(code: u8) -> Self {
        match code {
            0x1 => Token::Out,
            0x9 => Token::In,
            0x5 => Token::Sof,
            0xD => Token::Setup,
            other => Token::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx = 0,
    Tx = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    Even = 0,
    Odd = 1,
}

impl core::ops::Not for Bank {
    type Output = Bank;
    fn not(self) -> Bank {
        match self {
            Bank::Even => Bank::Odd,
            Bank::Odd => Bank::Even,
        }
    }
}

/// One BDT entry: a 32-bit control/status word plus a data pointer.
/// Both fields are `volatile_register::RW` because the peripheral's
/// DMA reads and writes them concurrently with software.
#[repr(C)]
pub struct BufferDescriptor {
    desc: RW<u32>,
    addr: RW<u32>,
}

impl BufferDescriptor {
    const fn zeroed() -> Self {
        // SAFETY: constructing a register wrapper over a plain RAM
        // cell that software owns exclusively until it is published
        // to the peripheral (OWN bit still clear). `volatile_register`
        // has no public constructor for `RW<T>`, but it is
        // `repr(transparent)` all the way down to `T`, so a zeroed
        // `T` transmutes into a zeroed `RW<T>`.
        unsafe {
            Self {
                desc: core::mem::transmute::<u32, RW<u32>>(0),
                addr: core::mem::transmute::<u32, RW<u32>>(0),
            }
        }
    }

    pub fn is_peripheral_owned(&self) -> bool {
        self.desc.read() & BD_OWN_MASK != 0
    }

    pub fn byte_count(&self) -> u16 {
        ((self.desc.read() >> BD_BC_SHIFT) & 0x3FF) as u16
    }

    pub fn data1(&self) -> bool {
        self.desc.read() & BD_DATA1_MASK != 0
    }

    pub fn token(&self) -> Token {
        Token::from_code(((self.desc.read() & BD_TOK_MASK) >> BD_TOK_SHIFT) as u8)
    }

    pub fn data_addr(&self) -> u32 {
        self.addr.read()
    }

    /// Forcibly clear this descriptor, reclaiming software ownership
    /// unconditionally. Used on EP0 SETUP (the TX descriptors must be
    /// software-owned again regardless of any in-flight state) and on
    /// bus reset.
    pub fn clear(&mut self) {
        // SAFETY: only called while software holds the only reference
        // to this descriptor (mutable borrow) and intends to drop any
        // peripheral claim on it.
        unsafe { self.desc.write(0) };
    }

    /// Hand this descriptor to the peripheral for transmission.
    /// `data1` selects the DATA0/DATA1 toggle to arm; `addr`/`length`
    /// describe the buffer the peripheral will read from.
    fn arm(&mut self, addr: u32, length: u16, data1: bool) {
        // SAFETY: caller (bdt arm_tx/init_endpoint) holds the only
        // software reference to this descriptor and has verified it
        // is currently software-owned.
        unsafe {
            self.addr.write(addr);
            dmb();
            let data1_bit = if data1 { BD_DATA1_MASK } else { 0 };
            self.desc
                .write(((length as u32) << BD_BC_SHIFT) | BD_OWN_MASK | BD_DTS_MASK | data1_bit);
        }
    }

    /// Re-arm this descriptor to receive, preserving the DATA0/DATA1
    /// toggle it was most recently carrying.
    fn release_rx(&mut self, size: u16) {
        let data1 = self.data1();
        let data1_bit = if data1 { BD_DATA1_MASK } else { 0 };
        // SAFETY: called only from the TOKEN-DONE RX path after
        // software has regained ownership (OWN bit observed clear).
        unsafe {
            dmb();
            self.desc
                .write(((size as u32) << BD_BC_SHIFT) | BD_OWN_MASK | BD_DTS_MASK | data1_bit);
        }
    }
}

/// Per-endpoint software state: which bank the *next* transmission
/// uses, and which DATA toggle it must carry.
#[derive(Debug, Clone, Copy)]
struct TxState {
    bank: Bank,
    data1: bool,
}

impl TxState {
    const fn reset() -> Self {
        Self {
            bank: Bank::Even,
            data1: false,
        }
    }

    fn flip(&mut self) {
        self.bank = !self.bank;
        self.data1 = !self.data1;
    }
}

/// Buffer Descriptor Table: `USB_NUM_ENDPOINTS * 4` entries indexed by
/// `(endpoint, direction, bank)`. Must sit at a 512-byte aligned
/// address — its base is programmed into the peripheral's three BDT
/// page registers during `usb_device_init`.
#[repr(C, align(512))]
pub struct Bdt {
    entries: [BufferDescriptor; USB_NUM_ENDPOINTS * 4],
    tx_state: [TxState; USB_NUM_ENDPOINTS],
}

fn index(endpoint: usize, dir: Direction, bank: Bank) -> usize {
    (endpoint << 2) | ((dir as usize) << 1) | (bank as usize)
}

impl Bdt {
    pub const fn new() -> Self {
        Self {
            entries: [
                BufferDescriptor::zeroed(),
                BufferDescriptor::zeroed(),
                BufferDescriptor::zeroed(),
                BufferDescriptor::zeroed(),
                BufferDescriptor::zeroed(),
                BufferDescriptor::zeroed(),
                BufferDescriptor::zeroed(),
                BufferDescriptor::zeroed(),
            ],
            tx_state: [TxState::reset(), TxState::reset()],
        }
    }

    pub fn base_address(&self) -> u32 {
        self.entries.as_ptr() as u32
    }

    pub fn descriptor(&mut self, endpoint: usize, dir: Direction, bank: Bank) -> &mut BufferDescriptor {
        &mut self.entries[index(endpoint, dir, bank)]
    }

    pub fn descriptor_ref(&self, endpoint: usize, dir: Direction, bank: Bank) -> &BufferDescriptor {
        &self.entries[index(endpoint, dir, bank)]
    }

    /// Arm the bank currently designated `tx_bank` for `endpoint`,
    /// then flip both `tx_bank` and `tx_data1` (invariant 4).
    pub fn arm_tx(&mut self, endpoint: usize, addr: u32, length: u16) {
        let state = self.tx_state[endpoint];
        let bd = self.descriptor(endpoint, Direction::Tx, state.bank);
        bd.arm(addr, length, state.data1);
        self.tx_state[endpoint].flip();
    }

    /// Which bank the *next* `arm_tx(endpoint, ..)` call will target.
    pub fn next_tx_bank(&self, endpoint: usize) -> Bank {
        self.tx_state[endpoint].bank
    }

    /// True iff the BD that the *next* transmission would use is
    /// currently software-owned.
    pub fn tx_descriptor_free(&self, endpoint: usize) -> bool {
        let bank = self.tx_state[endpoint].bank;
        !self.descriptor_ref(endpoint, Direction::Tx, bank).is_peripheral_owned()
    }

    /// Forcibly clear both TX descriptors of `endpoint` and reset the
    /// DATA toggle to DATA1 (the data stage after a SETUP always
    /// starts with DATA1). Used on EP0 SETUP.
    pub fn clear_tx_and_reset_data1(&mut self, endpoint: usize) {
        self.descriptor(endpoint, Direction::Tx, Bank::Even).clear();
        self.descriptor(endpoint, Direction::Tx, Bank::Odd).clear();
        self.tx_state[endpoint] = TxState {
            bank: Bank::Even,
            data1: true,
        };
    }

    pub fn release_rx(&mut self, endpoint: usize, bank: Bank, size: u16) {
        self.descriptor(endpoint, Direction::Rx, bank).release_rx(size);
    }

    /// Zero the TX BDs, arm EVEN-RX as DATA0 and ODD-RX as DATA1
    /// against the two halves of `rx_buffer`, and reset the
    /// endpoint's TX state to (EVEN, DATA0).
    pub fn init_endpoint(&mut self, endpoint: usize, rx_buffer: &mut [[u8; ENDPOINT_BUF_SIZE as usize]; 2]) {
        self.descriptor(endpoint, Direction::Tx, Bank::Even).clear();
        self.descriptor(endpoint, Direction::Tx, Bank::Odd).clear();

        let even_addr = rx_buffer[Bank::Even as usize].as_mut_ptr() as u32;
        self.descriptor(endpoint, Direction::Rx, Bank::Even).arm(even_addr, ENDPOINT_BUF_SIZE, false);

        let odd_addr = rx_buffer[Bank::Odd as usize].as_mut_ptr() as u32;
        self.descriptor(endpoint, Direction::Rx, Bank::Odd).arm(odd_addr, ENDPOINT_BUF_SIZE, true);

        self.tx_state[endpoint] = TxState::reset();
    }
}

impl Default for Bdt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rx_buf() -> [[u8; ENDPOINT_BUF_SIZE as usize]; 2] {
        [[0u8; ENDPOINT_BUF_SIZE as usize]; 2]
    }

    #[test]
    fn init_endpoint_arms_even_data0_odd_data1() {
        let mut bdt = Bdt::new();
        let mut rx = rx_buf();
        bdt.init_endpoint(1, &mut rx);

        let even = bdt.descriptor_ref(1, Direction::Rx, Bank::Even);
        assert!(even.is_peripheral_owned());
        assert!(!even.data1());
        assert_eq!(even.byte_count(), ENDPOINT_BUF_SIZE);

        let odd = bdt.descriptor_ref(1, Direction::Rx, Bank::Odd);
        assert!(odd.is_peripheral_owned());
        assert!(odd.data1());

        assert!(!bdt.descriptor_ref(1, Direction::Tx, Bank::Even).is_peripheral_owned());
        assert!(!bdt.descriptor_ref(1, Direction::Tx, Bank::Odd).is_peripheral_owned());
    }

    #[test]
    fn release_rx_preserves_toggle() {
        let mut bdt = Bdt::new();
        let mut rx = rx_buf();
        bdt.init_endpoint(1, &mut rx);

        // simulate the peripheral completing a reception and handing
        // the EVEN bank (DATA0) back to software
        bdt.descriptor(1, Direction::Rx, Bank::Even).clear();
        assert!(!bdt.descriptor_ref(1, Direction::Rx, Bank::Even).is_peripheral_owned());

        bdt.release_rx(1, Bank::Even, ENDPOINT_BUF_SIZE);
        let even = bdt.descriptor_ref(1, Direction::Rx, Bank::Even);
        assert!(even.is_peripheral_owned());
        assert!(!even.data1(), "EVEN bank must stay DATA0 across re-arming");

        bdt.descriptor(1, Direction::Rx, Bank::Odd).clear();
        bdt.release_rx(1, Bank::Odd, ENDPOINT_BUF_SIZE);
        assert!(bdt.descriptor_ref(1, Direction::Rx, Bank::Odd).data1(), "ODD bank must stay DATA1");
    }

    #[test]
    fn arm_tx_flips_bank_and_toggle_each_time() {
        let mut bdt = Bdt::new();
        bdt.init_endpoint(1, &mut rx_buf());

        assert!(bdt.tx_descriptor_free(1));
        bdt.arm_tx(1, 0x2000_0000, 64);
        assert!(bdt.descriptor_ref(1, Direction::Tx, Bank::Even).is_peripheral_owned());
        assert!(!bdt.descriptor_ref(1, Direction::Tx, Bank::Even).data1());

        // the endpoint's next arming must now target ODD with DATA1
        assert!(bdt.tx_descriptor_free(1), "ODD bank is still software-owned");
        bdt.arm_tx(1, 0x2000_0040, 32);
        let second = bdt.descriptor_ref(1, Direction::Tx, Bank::Odd);
        assert!(second.is_peripheral_owned());
        assert!(second.data1());
        assert_eq!(second.byte_count(), 32);
    }
}
