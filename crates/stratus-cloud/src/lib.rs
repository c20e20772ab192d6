//! Stratus Cloud Provider Core
//!
//! This crate provides the vendor-neutral half of a declarative cloud
//! provider: the host drives create/read/update/delete through
//! [`ResourceLifecycle`], mutating calls are resolved with
//! [`OperationPoller`], and state written by older provider versions is
//! brought forward with [`MigrationChain`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │          Orchestration host (plan/diff)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │ create / read / update / delete / upgrade
//! ┌─────────────────▼───────────────────────────────┐
//! │                 stratus-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │        trait ResourceLifecycle            │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────────────┐    │
//! │  │   Operation  │  │   State migration    │    │
//! │  │    Poller    │  │   (flat attributes)  │    │
//! │  └──────────────┘  └──────────────────────┘    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │  google-cloud │
//!           │   provider    │
//!           └───────────────┘
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod operation;
pub mod resource;

// Re-exports
pub use config::{Endpoints, MIN_POLL_INTERVAL, PollConfig, ProviderConfig, Service};
pub use error::{CloudError, Result};
pub use logging::{init_logging, try_init_logging};
pub use migrate::{MigrationChain, StateMigration};
pub use operation::{
    OperationError, OperationHandle, OperationPoller, OperationScope, OperationSource,
    OperationStatus,
};
pub use resource::{
    AuthStatus, ResourceConfig, ResourceLifecycle, ResourceState, flatten_attributes,
};
