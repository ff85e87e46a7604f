//! # Quill Codec
//!
//! Document value model and log-line codec for QuillDB.
//!
//! This crate provides:
//! - The dynamic [`Value`] type documents are made of
//! - The cross-type total order used by indexes and sorting
//! - Dotted-path access (`get_dot_value` and friends)
//! - The newline-record text codec (`serialize` / `deserialize`) with
//!   `{"$$date": ms}` timestamp tagging

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod line;
mod path;
mod value;

pub use error::{CodecError, CodecResult};
pub use line::{deserialize, serialize};
pub use path::{get_dot_value, set_dot_value, unset_dot_value};
pub use value::{StringComparator, Value};
