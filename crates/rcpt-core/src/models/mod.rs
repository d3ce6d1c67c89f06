//! Data models for the rcpt library.

pub mod config;
pub mod credentials;
pub mod receipt;

pub use config::RcptConfig;
pub use credentials::{ApiKey, Credentials};
pub use receipt::{LineItem, StructuredReceipt};
