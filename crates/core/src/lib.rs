#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod presentation;
pub mod scoring;
pub mod session;
pub mod stats;
pub mod time;

pub use error::Error;
pub use time::Clock;
