//! An async SCADA master for Modbus TCP field devices built on [Tokio](https://docs.rs/tokio).
//!
//! # Features
//!
//! * Periodic acquisition of input blocks with a per block poll interval
//! * Point database with engineering unit conversion and limit alarming
//! * Single in flight command execution with response timeouts
//! * Automatic connection management with a configurable reconnect strategy
//! * Panic-free parsing
//! * Protocol decoding in the log at the application, frame and physical layers
//!
//! # Supported Functions
//!
//! * Read Coils
//! * Read Discrete Inputs
//! * Read Holding Registers
//! * Read Input Registers
//! * Write Single Coil
//! * Write Single Register
//!
//! # Example
//!
//! ```no_run
//! use modmaster::*;
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let configuration = Configuration::from_file("points.txt")?;
//!     let addr = std::net::SocketAddr::from(([127, 0, 0, 1], configuration.tcp_port()));
//!     let master = Master::spawn_tcp(addr, configuration, MasterConfig::default());
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!     for point in master.store().snapshot() {
//!         println!("{point}");
//!     }
//!
//!     master.shutdown().await;
//!     Ok(())
//! }
//! ```

/// Encoding of commands and decoding of responses
pub mod codec;
/// Error types returned by the library
pub mod error;
/// Command queue and the task that executes it against a device
pub mod executor;

pub use crate::acquisitor::*;
pub use crate::alarm::*;
pub use crate::common::function::FunctionCode;
pub use crate::common::phys::Transport;
pub use crate::config::*;
pub use crate::decode::*;
pub use crate::egu::*;
pub use crate::exception::*;
pub use crate::master::*;
pub use crate::point::*;
pub use crate::processing::*;
pub use crate::retry::*;
pub use crate::store::*;
pub use crate::types::*;

// internal modules
mod acquisitor;
mod alarm;
mod channel;
mod common;
mod config;
mod constants;
mod decode;
mod egu;
mod exception;
mod master;
mod point;
mod processing;
mod retry;
mod store;
mod types;
