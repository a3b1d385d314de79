use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use super::message::PollerMessage;
use super::state::SensorState;
use super::state::State;
use crate::poller::Poller;

/// Capacity for the poller→engine message channel
///
/// Provides backpressure if pollers report faster than the engine can
/// process, which only happens with very short scan intervals.
const FROM_POLLER_CHANNEL_SIZE: usize = 64;

/// restpolld engine
///
/// Owns the published-value store. Poller tasks report each cycle's
/// outcome over a channel; the engine applies it to a centralized state
/// snapshot that the API surface reads lock-free.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Receive cycle outcomes from pollers
    message_rx: Mutex<mpsc::Receiver<PollerMessage>>,

    /// Sender handed to each registered poller
    message_tx: mpsc::Sender<PollerMessage>,

    /// Handles for poller tasks
    poller_handles: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_POLLER_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            poller_handles: Vec::new(),
        }
    }

    /// Register a poller with the engine
    ///
    /// Seeds the sensor into the state snapshot (unavailable until its
    /// first successful cycle) and spawns the poller's run loop in a
    /// background task.
    pub fn register_poller(&mut self, poller: Poller) {
        {
            let mut state = State::clone(&self.state.load());
            state.sensors.insert(
                poller.sensor_id().to_string(),
                SensorState {
                    name: poller.name().to_string(),
                    ..SensorState::default()
                },
            );
            self.state.store(Arc::new(state));
        }

        let tx = self.message_tx.clone();
        let handle = tokio::spawn(async move {
            poller.run(tx).await;
        });
        self.poller_handles.push(handle);
    }

    /// Run the engine's main loop
    ///
    /// Applies incoming cycle outcomes to the state snapshot. Returns
    /// when every sender is gone, which in practice means shutdown.
    pub async fn run(&self) {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_message(msg);
        }

        info!("Engine shutting down");
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Apply one cycle outcome to the state snapshot
    fn handle_message(&self, msg: PollerMessage) {
        match msg {
            PollerMessage::Published {
                sensor_id,
                state,
                attributes,
            } => {
                info!("Sensor updated: {} -> {}", sensor_id, state);

                let mut snapshot = State::clone(&self.state.load());
                let sensor = snapshot.sensors.entry(sensor_id).or_default();
                sensor.state = Some(state);
                sensor.attributes = attributes;
                sensor.available = true;
                sensor.last_error = None;
                self.state.store(Arc::new(snapshot));
            }
            PollerMessage::Unavailable { sensor_id, reason } => {
                warn!("Sensor unavailable: {} ({})", sensor_id, reason);

                // Keep the last published state and attributes; only flip
                // availability and record the reason.
                let mut snapshot = State::clone(&self.state.load());
                let sensor = snapshot.sensors.entry(sensor_id).or_default();
                sensor.available = false;
                sensor.last_error = Some(reason);
                self.state.store(Arc::new(snapshot));
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
