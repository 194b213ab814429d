//! Static USB descriptor blob and the (wValue, wIndex) lookup table.
//!
//! The engine never parses these bytes; they are opaque, wired up
//! once at compile time. Contents below describe one configuration,
//! one HID interface, and the two 64-byte interrupt endpoints this
//! part's stream-over-HID protocol runs on.

pub const VENDOR_ID: u16 = 0x16C0; // Van Ooijen Technische Informatica (shared VID)
pub const PRODUCT_ID: u16 = 0x05DF;

const HID_REPORT_DESCRIPTOR: [u8; 27] = [
    0x06, 0x00, 0xFF, //   Usage Page (Vendor Defined 0xFF00)
    0x09, 0x01, //   Usage (0x01)
    0xA1, 0x01, //   Collection (Application)
    0x19, 0x01, //     Usage Minimum (0x01)
    0x29, 0x01, //     Usage Maximum (0x01)
    0x15, 0x00, //     Logical Minimum (0)
    0x26, 0xFF, 0x00, //     Logical Maximum (255)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x3F, //     Report Count (63)
    0x81, 0x02, //     Input (Data,Var,Abs)
    0x95, 0x3F, //     Report Count (63)
    0x91, 0x02, //     Output (Data,Var,Abs)
    0xC0, //   End Collection
];

pub const DEVICE_DESCRIPTOR: [u8; 18] = [
    18, // bLength
    1,  // bDescriptorType (Device)
    0x00, 0x02, // bcdUSB 2.0
    0,  // bDeviceClass (defined at interface level)
    0,  // bDeviceSubClass
    0,  // bDeviceProtocol
    64, // bMaxPacketSize0
    (VENDOR_ID & 0xFF) as u8,
    (VENDOR_ID >> 8) as u8,
    (PRODUCT_ID & 0xFF) as u8,
    (PRODUCT_ID >> 8) as u8,
    0x01, 0x00, // bcdDevice 1.0
    1, // iManufacturer
    2, // iProduct
    0, // iSerialNumber
    1, // bNumConfigurations
];

const CONFIG_TOTAL_LENGTH: u16 = 9 + 9 + 9 + 7 + 7;

pub const CONFIG_DESCRIPTOR: [u8; 41] = [
    // Configuration descriptor
    9, // bLength
    2, // bDescriptorType (Configuration)
    (CONFIG_TOTAL_LENGTH & 0xFF) as u8,
    (CONFIG_TOTAL_LENGTH >> 8) as u8,
    1,    // bNumInterfaces
    1,    // bConfigurationValue
    0,    // iConfiguration
    0x80, // bmAttributes (bus powered)
    50,   // bMaxPower (100 mA)
    // Interface descriptor
    9, // bLength
    4, // bDescriptorType (Interface)
    0, // bInterfaceNumber
    0, // bAlternateSetting
    2, // bNumEndpoints
    3, // bInterfaceClass (HID)
    0, // bInterfaceSubClass (none — not boot protocol)
    0, // bInterfaceProtocol
    0, // iInterface
    // HID descriptor
    9,    // bLength
    0x21, // bDescriptorType (HID)
    0x11, 0x01, // bcdHID 1.11
    0, // bCountryCode
    1, // bNumDescriptors
    0x22, // bDescriptorType (Report)
    HID_REPORT_DESCRIPTOR.len() as u8, 0, // wDescriptorLength
    // Endpoint descriptor (EP1 IN — interrupt)
    7,    // bLength
    5,    // bDescriptorType (Endpoint)
    0x81, // bEndpointAddress (EP1 IN)
    0x03, // bmAttributes (Interrupt)
    64, 0, // wMaxPacketSize
    1, // bInterval (1ms)
    // Endpoint descriptor (EP1 OUT — interrupt)
    7,    // bLength
    5,    // bDescriptorType (Endpoint)
    0x01, // bEndpointAddress (EP1 OUT)
    0x03, // bmAttributes (Interrupt)
    64, 0, // wMaxPacketSize
    1, // bInterval (1ms)
];

/// String descriptor 0: supported language IDs (English, US).
const STRING_DESC_0: [u8; 4] = [4, 3, 0x09, 0x04];

const fn ascii_string_descriptor<const N: usize>(ascii: &'static [u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out[0] = N as u8;
    out[1] = 3;
    let mut i = 0;
    while i < ascii.len() {
        out[2 + i * 2] = ascii[i];
        out[2 + i * 2 + 1] = 0;
        i += 1;
    }
    out
}

const STRING_DESC_1: [u8; 16] = ascii_string_descriptor(b"IdealIO");
const STRING_DESC_2: [u8; 22] = ascii_string_descriptor(b"HID Bridge");

/// One entry in the descriptor table: a byte blob answered for an
/// exact `(wValue, wIndex)` match on a GET_DESCRIPTOR request.
pub struct DescriptorEntry {
    pub w_value: u16,
    pub w_index: u16,
    pub bytes: &'static [u8],
}

pub static DESCRIPTOR_TABLE: &[DescriptorEntry] = &[
    DescriptorEntry {
        w_value: 0x0300,
        w_index: 0x0000,
        bytes: &STRING_DESC_0,
    },
    DescriptorEntry {
        w_value: 0x0301,
        w_index: 0x0409,
        bytes: &STRING_DESC_1,
    },
    DescriptorEntry {
        w_value: 0x0302,
        w_index: 0x0409,
        bytes: &STRING_DESC_2,
    },
    DescriptorEntry {
        w_value: 0x0100,
        w_index: 0x0000,
        bytes: &DEVICE_DESCRIPTOR,
    },
    DescriptorEntry {
        w_value: 0x0200,
        w_index: 0x0000,
        bytes: &CONFIG_DESCRIPTOR,
    },
    DescriptorEntry {
        w_value: 0x2200,
        w_index: 0x0000,
        bytes: &HID_REPORT_DESCRIPTOR,
    },
];

/// First-match lookup by `(wValue, wIndex)`. Returns `None` (the
/// caller then STALLs) when nothing matches.
pub fn lookup(w_value: u16, w_index: u16) -> Option<&'static [u8]> {
    DESCRIPTOR_TABLE
        .iter()
        .find(|entry| entry.w_value == w_value && entry.w_index == w_index)
        .map(|entry| entry.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_device_descriptor() {
        let bytes = lookup(0x0100, 0x0000).expect("device descriptor present");
        assert_eq!(bytes.len(), 18);
        assert_eq!(bytes, &DEVICE_DESCRIPTOR[..]);
    }

    #[test]
    fn unknown_pair_is_absent() {
        assert!(lookup(0xFFFF, 0xFFFF).is_none());
    }

    #[test]
    fn first_match_wins_on_duplicate_keys() {
        // sanity: every entry in the real table is unique, so lookup
        // is deterministic regardless of scan order.
        let mut seen = heapless::Vec::<(u16, u16), 16>::new();
        for entry in DESCRIPTOR_TABLE {
            let key = (entry.w_value, entry.w_index);
            assert!(!seen.contains(&key), "duplicate descriptor key {:?}", key);
            seen.push(key).unwrap();
        }
    }
}
