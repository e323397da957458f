//! mailbundle — turn selected email search results into a downloadable
//! ZIP archive.
//!
//! The pipeline groups emails into entity folders, derives collision-free
//! file names, composes a combined PDF and JSON record per unit, and streams
//! everything into a deterministic ZIP. See [`archive::build_archive`] for
//! the entry point.

pub mod archive;
pub mod compose;
pub mod config;
pub mod entity;
pub mod error;
pub mod fetch;
pub mod model;
pub mod naming;

pub use archive::{build_archive, suggested_archive_name, ArchiveSummary};
pub use entity::Entity;
pub use error::{BundleError, Result};
pub use model::SelectedItem;
