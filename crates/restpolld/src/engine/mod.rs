mod engine;
mod message;
pub mod state;

pub use engine::Engine;
pub use message::PollerMessage;
pub use state::Attributes;
pub use state::SensorState;
pub use state::State;
