//! USB HID stream-tunnel device engine: the BDT/ping-pong data plane,
//! the endpoint-0 control pipe, and the endpoint-1 stream-over-HID
//! protocol, as a hardware-free, host-testable library. `main.rs`
//! wires this engine to the KL25Z's real registers; nothing in this
//! crate root touches hardware directly.

#![no_std]

pub mod bdt;
pub mod config;
pub mod descriptors;
pub mod engine;
pub mod ep0;
pub mod ep1;
pub mod errors;
pub mod fifo;
pub mod hooks;

// Both touch real MMIO addresses (`pac`) or call `defmt`'s logging
// macros without a logger linked in (`isr`, on a host test binary) —
// host test builds exclude them the same way an `avr_device`
// `Peripherals` handle is only reachable on-target, never from a
// host unit test.
#[cfg(not(test))]
pub mod isr;
#[cfg(not(test))]
pub mod pac;

pub use config::Config;
pub use engine::Engine;
pub use hooks::EngineHooks;
