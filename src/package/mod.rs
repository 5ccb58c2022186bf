//! Package metadata and the local install root
//!
//! - `descriptor` - registry metadata merged with local install state
//! - `catalog` - per-session cache of descriptors
//! - `layout` - where packages, staging and the index live on disk
//! - `manifest` - the `package.json` inside each package

mod catalog;
mod descriptor;
mod layout;
mod manifest;

pub use catalog::PackageCatalog;
pub use descriptor::{PackageDescriptor, PackageSummary};
pub use layout::{
    INDEX_FILE, InstallLayout, InstalledPackage, STAGING_DIR, default_install_root,
};
pub use manifest::{MANIFEST_FILE, PackageManifest};
