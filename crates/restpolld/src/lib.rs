pub mod api;
pub mod config;
mod engine;
mod poller;
pub mod template;

pub use config::Config;
pub use config::Diagnostic;
pub use config::LogLevel;
pub use config::SensorConfig;
pub use config::format_diagnostics;
pub use engine::Attributes;
pub use engine::Engine;
pub use engine::PollerMessage;
pub use engine::SensorState;
pub use engine::State;
pub use poller::HttpFetch;
pub use poller::PollError;
pub use poller::Poller;
pub use poller::PublishedState;
pub use poller::ReqwestFetch;
pub use template::JinjaRenderer;
pub use template::Render;
