//! CLI-facing operations. Each builds a `Config`, does its work and prints
//! the result to stdout.

mod available;
mod info;
mod install;
mod list;
mod resolve;
mod uninstall;
mod upgrade;

pub use available::available;
pub use info::info;
pub use install::{PackageRequest, install};
pub use list::list;
pub use resolve::resolve;
pub use uninstall::uninstall;
pub use upgrade::upgrade;
