//! Built-in channel sources.
//!
//! Each module provides a struct implementing [`crate::SearchPlugin`] with
//! [`crate::SourceKind::Channel`] as its kind.

pub mod telegram;

pub use telegram::TelegramChannel;
