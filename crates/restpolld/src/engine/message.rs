//! Messages from poller tasks to the engine.
//!
//! Pollers never touch `State` directly; every cycle ends in exactly one
//! of these messages, and the engine's run loop is the single writer.

use super::state::Attributes;

/// Outcome of one poll cycle, reported to the engine
#[derive(Debug)]
pub enum PollerMessage {
    /// The cycle succeeded; overwrite the sensor's published value
    Published {
        sensor_id: String,
        state: String,
        attributes: Attributes,
    },

    /// The cycle failed; keep the previous published value and mark the
    /// sensor unavailable until the next successful cycle
    Unavailable { sensor_id: String, reason: String },
}
