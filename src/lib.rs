#![deny(clippy::all)]
#![allow(clippy::new_ret_no_self)]
#![allow(clippy::useless_attribute)]

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate cascade;
#[macro_use]
extern crate fomat_macros;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod backup;
pub mod config;
pub mod distribution;
pub mod executor;
pub mod hooks;
pub mod lock;
pub mod logging;
pub mod misc;
pub mod orchestrator;
pub mod plan;
pub mod preflight;
pub mod prompt;
pub mod repos;
pub mod resolver;
pub mod signal_handler;
pub mod snapshot;
pub mod status;
pub mod version;

#[cfg(test)]
mod testing;
