pub mod http;
pub mod service;

pub use http::*;
pub use service::*;
