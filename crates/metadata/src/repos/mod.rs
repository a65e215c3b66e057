//! Repository traits for metadata operations.

pub mod access_policies;
pub mod allowlist;
pub mod objects;

pub use access_policies::AccessPolicyRepo;
pub use allowlist::AllowlistRepo;
pub use objects::ObjectRepo;
