//! HTTP request handlers.

pub mod batch;
pub mod health;
pub mod oauth;
pub mod transfer;
pub mod verify;

pub use batch::*;
pub use health::*;
pub use oauth::*;
pub use transfer::*;
pub use verify::*;
