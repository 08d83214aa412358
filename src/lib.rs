pub mod area;
pub mod binlog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fifo;
pub mod hash;
pub mod logging;
pub mod monitor;
pub mod queue;
pub mod retrieve;
pub mod scan;
pub mod supervisor;
pub mod typesize;
pub mod util;

pub use error::{CoreError, ExitCode};
