//! Credential protection.
//!
//! Credentials are stored in `Zeroizing` containers and cleared from memory
//! on drop. They are never part of `Debug` output, serialized descriptors, or
//! error messages.

mod credentials;

pub use credentials::Credentials;
