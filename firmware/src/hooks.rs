//! Application-supplied policy object, replacing the weak-symbol hook
//! linkage a C firmware of this shape would use (§9 Design Notes:
//! "Weak hook linkage → explicit policy object"). The engine holds a
//! `&'static dyn EngineHooks` it was handed at init time and calls
//! into it from ISR context; every method defaults to a no-op so an
//! application that doesn't care about activity LEDs or OOB messages
//! need not implement anything.

/// Activity and message callbacks the engine invokes from interrupt
/// context. Implementations must be fast and must not block.
pub trait EngineHooks {
    /// RX traffic is live (arming or completion observed). Cleared by
    /// the next SOF.
    fn on_rx_activity(&self, _on: bool) {}
    /// TX traffic is live. Cleared by the next SOF.
    fn on_tx_activity(&self, _on: bool) {}
    /// An out-of-band message was received on EP1 OUT.
    fn on_message_packet(&self, _payload: &[u8]) {}
}

/// Default hook set used when the application registers none.
pub struct NoopHooks;

impl EngineHooks for NoopHooks {}
