//! Core library shared by the `sender` and `receiver` binaries: the
//! fragment codec, hasher, drop store abstraction, job/manifest data model,
//! job registry, and the config/error/logging ambient stack.

pub mod config;
pub mod error;
pub mod fragment;
pub mod hash;
pub mod job;
pub mod logger;
pub mod registry;
pub mod store;

pub use error::{RelayError, Result};
