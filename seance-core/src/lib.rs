//! # seance-core
//!
//! Session-content synchronization layer for a desktop session browser.
//!
//! This library provides:
//! - A change event monitor that dedups and debounces bursts of "something
//!   changed on disk" notifications into a single coalesced refresh
//! - A resilient invoker wrapping the outbound procedure boundary with
//!   bounded retry and linear backoff
//! - A level-scoped cache coordinator keeping the three dependent views of a
//!   session (preference, message list, QA list) coherent
//! - A pure QA-to-timeline normalizer
//!
//! ## Architecture
//!
//! Change notifications flow through a named [`events::EventBus`] channel
//! into the [`monitor::ChangeMonitor`], which triggers the
//! [`cache::CacheCoordinator`]'s refresh. The coordinator fetches through a
//! [`rpc::SessionClient`], and [`timeline::from_qa_pairs`] reshapes the QA
//! result for feed presentation. Rendering, navigation, and the persistence
//! format of the underlying store are external collaborators.
//!
//! ## Example
//!
//! ```rust,no_run
//! use seance_core::Config;
//!
//! let config = Config::load().expect("failed to load config");
//! let _log_guard = seance_core::logging::init(&config.logging).expect("failed to init logging");
//! ```

// Re-export commonly used items at the crate root
pub use cache::{AutoRefreshGuard, CacheCoordinator, CacheKey, CachedEntry};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventBus, Subscription};
pub use monitor::{ChangeMonitor, MonitorCallbacks, MonitorOptions};
pub use rpc::{CallOptions, Invoker, RetryPolicy, SessionBackend, SessionClient};
pub use types::*;

// Public modules
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod monitor;
pub mod rpc;
pub mod timeline;
pub mod types;
