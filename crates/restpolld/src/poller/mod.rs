mod coerce;
mod error;
mod http;
#[allow(clippy::module_inception)]
mod poller;

pub use coerce::PublishedState;
pub use error::PollError;
pub use http::HttpFetch;
pub use http::ReqwestFetch;
pub use poller::Poller;
