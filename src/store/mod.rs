// Metadata store - users, albums and photo records as JSON documents
mod core;
mod documents;
mod error;
mod types;

pub use core::{ALBUMS_FILE, METADATA_FILE, MetadataStore, USERS_FILE};
pub use documents::{DocumentStore, LockedDocument};
pub use error::StoreError;
pub use types::*;

#[cfg(test)]
mod tests;
