//! Install and uninstall orchestration.
//!
//! # Structure
//!
//! - `state` - per-package lifecycle and its legal transitions
//! - `gate` - per-name serialization plus a global concurrency cap
//! - `resolver` - dependency walk producing an install plan
//! - `installer` - download, extract and place packages

mod gate;
mod installer;
mod resolver;
mod state;

pub use gate::{DEFAULT_MAX_CONCURRENCY, OperationGate, OperationPermit};
pub use installer::PackageInstaller;
pub use resolver::{DependencyResolver, PlannedInstall};
pub use state::{InstallState, InvalidTransition};
