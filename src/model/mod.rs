//! Input data model: selected items and attachment references.

pub mod item;

pub use item::{AttachmentRef, ResolvedAttachment, SelectedItem};
