//! # herbarium-shared
//!
//! Domain types shared by every herbarium crate: the specimen record model,
//! roles and the access policy, signed access tokens and the collection-wide
//! constants.

pub mod constants;
pub mod error;
pub mod policy;
pub mod specimen;
pub mod token;
pub mod types;

pub use specimen::{ImageDescriptor, SpecimenRecord, Taxonomy};
pub use types::{Role, StorageMode, UserId};
