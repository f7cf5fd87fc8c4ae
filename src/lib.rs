//! # panhub
//!
//! Host process for [`panhub_search`]: loads TOML configuration, registers
//! the configured channel sources, and serves searches over a
//! newline-delimited JSON stdio bridge.

pub mod bridge;
pub mod config;
pub mod error;

pub use bridge::{ResponseEnvelope, build_service, run_bridge, run_stdio_bridge};
pub use config::AppConfig;
pub use error::{HostError, Result};
