pub mod cli;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod session;
pub mod transport;
