//! Reports the status of a (simulated) smart parking clamp to a collection server.
//!
//! [link] brings up and checks the wifi link, [reporter] owns the clamp's state and POSTs it
//! as JSON, and [monitor] runs the two together in a single blocking loop.
pub mod config;
pub mod error;
pub mod link;
pub mod monitor;
pub mod reporter;

pub use error::{Error, Result};
