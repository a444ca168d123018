//! Core types shared by every updater component.
//!
//! Currently this is the error taxonomy ([`UpdaterError`]) and the
//! operator-facing error rendering ([`ErrorContext`]).

pub mod error;

pub use error::{ErrorContext, IoResultExt, Result, UpdaterError, user_friendly_error};
