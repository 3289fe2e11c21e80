//! Plugin manifests for metarr
//!
//! Every plugin ships a `plugin.json` manifest in its own directory under
//! the configured plugin root. The manifest declares the plugin's identity
//! (`name`, `version`, `category`), an optional constructor locator
//! (`class_hint`), its static ordering edges (`depends_on`), its runtime
//! data requirements (`expects`), and the media categories it supports.
//!
//! - **types**: manifest data structures and the `expects` path grammar
//! - **registry**: directory scanning, validation, and the name-indexed map
//!
//! # Plugin directory structure
//!
//! ```text
//! plugins/
//! ├── scanner/
//! │   └── plugin.json
//! ├── renamer/
//! │   └── plugin.json
//! └── probe/
//!     └── plugin.json
//! ```
//!
//! # Example plugin.json
//!
//! ```json
//! {
//!   "name": "probe",
//!   "version": "1.0.0",
//!   "category": "output",
//!   "depends_on": ["renamer"],
//!   "expects": ["renamer.parsed"],
//!   "categories_supported": ["movie", "show"]
//! }
//! ```

mod registry;
mod types;

pub use registry::ManifestRegistry;
pub use types::{DataPath, Manifest, PluginCategory, MANIFEST_FILE};
