//! # duka-engine: Transactional API for Duka
//!
//! Library-level entry point consumed by the HTTP API and the real-time
//! notification layer. Adds, on top of `duka-db`:
//!
//! - input validation before any transaction opens
//! - a bounded retry loop for optimistic-lock conflicts
//! - post-commit events, queued and fanned out per branch
//! - configuration and tracing setup
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        duka-engine                                      │
//! │                                                                         │
//! │  HTTP handler ──► Engine ──► RetryPolicy ──► duka-db repositories       │
//! │                     │                              │                    │
//! │                     │ after COMMIT                 ▼                    │
//! │                     ▼                           SQLite                  │
//! │                 EventQueue ──► NotificationDispatcher ──► Subscriptions │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use duka_engine::{Channel, Engine, EngineConfig};
//!
//! duka_engine::telemetry::init_tracing();
//! let engine = Engine::start(&EngineConfig::load_or_default(None)).await?;
//! let mut feed = engine.subscribe(Channel::Branch("nbo-cbd".into()));
//!
//! let sale = engine.create_sale(&new_sale, &actor).await?;
//! while let Some(event) = feed.recv().await {
//!     println!("{}", event.topic());
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod notifier;
pub mod retry;
pub mod telemetry;

pub use config::{ConfigError, EngineConfig};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ErrorCode, ErrorResponse};
pub use events::{Channel, EngineEvent};
pub use notifier::{DispatcherHandle, EventQueue, NotificationDispatcher, Subscription};
pub use retry::RetryPolicy;
