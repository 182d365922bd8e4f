//! Core building blocks for network reconciliation
//!
//! This library provides:
//! - The error taxonomy shared by every reconciler
//! - Bounded retry for eventually consistent provider state
//! - The cloud networking provider boundary and its describe filters
//! - Event publishing and reconciler configuration

pub mod codes;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod provider;
pub mod retry;

pub use config::NetworkConfig;
pub use error::{NetworkError, Result};
pub use events::EventPublisher;
pub use provider::NetworkProvider;
pub use retry::{wait_for_with_retryable, RetryConfig};
