//! Core domain types shared by the Git LFS proxy crates.
//!
//! This crate defines the data model used by every other crate:
//! - Object identifiers, hash algorithms and derived storage keys
//! - Repository names as they appear in LFS URLs and credentials
//! - Cache key generators and their default TTLs
//! - Application configuration

pub mod config;
pub mod error;
pub mod keys;
pub mod object;
pub mod repository;

pub use error::{Error, Result};
pub use object::{HashAlgo, Oid, StorageKey};
pub use repository::RepositoryName;

/// Media type for Git LFS Batch and Verify payloads.
pub const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// The only transfer adapter this server implements.
pub const BASIC_TRANSFER: &str = "basic";
