pub mod capture;
pub mod html;
pub mod http;
pub mod pushover;

pub use crate::capture::CaptureSource;
pub use crate::http::HttpPageSource;
pub use crate::pushover::PushoverSink;
