//! # proxima-daemon
//!
//! Host process library for the proxima proximity-alert core.
//!
//! This library provides the scan sources, the logging alert driver, the
//! shared application state and the main loop used by the
//! `proxima-daemon` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod driver;
pub mod logging;
pub mod runtime;
pub mod scan;
pub mod state;
