//! Saturating counters for the conditions §7 of the protocol design
//! requires to be handled *somewhere* observable, without surfacing a
//! structured `Result` anywhere in the hot path. Mirrors the counter
//! fields `rcls-stm-common`'s `internal_debug` module keeps for its
//! own USB stack, but derived `defmt::Format` instead of a hand-rolled
//! debug macro.

#[derive(Debug, Clone, Copy, Default, defmt::Format)]
pub struct ErrorCounters {
    pub bus_resets: u32,
    pub hw_errors: u32,
    pub rx_fifo_overflows: u32,
    pub tx_fifo_full_rejections: u32,
    pub oob_busy_rejections: u32,
}

impl ErrorCounters {
    pub const fn new() -> Self {
        Self {
            bus_resets: 0,
            hw_errors: 0,
            rx_fifo_overflows: 0,
            tx_fifo_full_rejections: 0,
            oob_busy_rejections: 0,
        }
    }

    pub fn note_bus_reset(&mut self) {
        self.bus_resets = self.bus_resets.saturating_add(1);
    }

    pub fn note_hw_error(&mut self) {
        self.hw_errors = self.hw_errors.saturating_add(1);
    }

    pub fn note_rx_fifo_overflow(&mut self) {
        self.rx_fifo_overflows = self.rx_fifo_overflows.saturating_add(1);
    }

    pub fn note_tx_fifo_full_rejection(&mut self) {
        self.tx_fifo_full_rejections = self.tx_fifo_full_rejections.saturating_add(1);
    }

    pub fn note_oob_busy_rejection(&mut self) {
        self.oob_busy_rejections = self.oob_busy_rejections.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_saturate_instead_of_wrapping() {
        let mut counters = ErrorCounters::new();
        counters.bus_resets = u32::MAX;
        counters.note_bus_reset();
        assert_eq!(counters.bus_resets, u32::MAX);
    }
}
