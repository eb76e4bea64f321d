//! Module discovery and resolution.
//!
//! The registry walks a modules directory, reads one `module.json`
//! manifest per subdirectory, and resolves each manifest's `symbol`
//! against an explicitly registered [`FactorySet`]. Per-directory failures
//! are logged and skipped; they never abort discovery of the siblings.
//!
//! ```text
//! modules/
//! ├── echo/
//! │   ├── module.json      {"name": "echo", "category": "plugin",
//! │   │                     "entry": "echo.rs", "symbol": "EchoModule"}
//! │   └── echo.rs
//! ├── _disabled/           reserved prefix, skipped
//! └── broken/
//!     └── module.json      missing "entry" → logged, skipped
//! ```

mod descriptor;
mod discovery;
mod factory;
mod manifest;

pub use descriptor::ModuleDescriptor;
pub use discovery::Registry;
pub use factory::{FactorySet, ModuleFactory};
pub use manifest::{ModuleManifest, MANIFEST_FILE};
