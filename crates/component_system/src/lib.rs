//! # Component System
//!
//! A hierarchical component registry with an async event bus built on
//! structured concurrency.
//!
//! Components are named nodes bound to at most one [`ComponentManager`].
//! Managers are components too, so they nest into a tree. Handlers are
//! registered per event name on a manager; raising an event schedules every
//! matching handler, on that manager and on all managers below it, as tasks
//! in one [`Scope`].
//!
//! ## Key Features
//!
//! - **Leveled events**: an event with level `n` climbs `n` managers before
//!   it is broadcast, so a deep component can address a wider subtree
//! - **Structured concurrency**: a raise returns once every handler it
//!   scheduled has finished; the first failure cancels the rest
//! - **External scopes**: [`ExternalRaiseManager`] schedules into a scope
//!   owned by the host loop instead of waiting
//! - **Weak back-references**: components never keep their manager alive
//!
//! ## Usage
//!
//! ```rust,no_run
//! use component_system::*;
//! use std::sync::Arc;
//!
//! # async fn demo() -> component_system::Result<()> {
//! let root: Arc<DefaultManager> = ComponentManager::new("game");
//! let sound = BasicComponent::<serde_json::Value>::shared("sound");
//! root.add_component(sound.clone())?;
//!
//! sound.register_handler(
//!     "cat_moved",
//!     Handler::from_fn(|event: &Event<serde_json::Value>| {
//!         tracing::info!("cat moved to {}", event.data());
//!         Ok(())
//!     }),
//! )?;
//!
//! root.raise_event(Event::shared("cat_moved", serde_json::json!([3, 3]), 0)).await?;
//! # Ok(())
//! # }
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod event;
pub mod external;
pub mod logging;
pub mod manager;
pub mod scope;


// Re-exports for convenience
pub use component::{BasicComponent, Binding, Component, ComponentName};
pub use config::{ComponentSystemConfig, LoggingSettings, ManagerConfig};
pub use error::{ComponentError, ConfigError, ErrorKind};
pub use event::{Event, Handler, HandlerFuture, HandlerId, Payload};
pub use external::ExternalRaiseManager;
pub use logging::setup_logging;
pub use manager::{ComponentManager, TemporaryComponent};
pub use scope::Scope;

/// Version of this crate
pub const COMPONENT_SYSTEM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Manager carrying JSON payloads (most common use case)
pub type DefaultManager = ComponentManager<serde_json::Value>;

/// Result type used throughout the system
pub type Result<T> = std::result::Result<T, ComponentError>;
