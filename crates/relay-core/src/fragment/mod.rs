//! Fragment codec: split a byte stream into indexed fragments, merge them
//! back, and encode/decode the sidecar manifest.

pub mod manifest;
pub mod merge;
pub mod split;

pub use manifest::{Fragment, Manifest};
pub use merge::merge as merge_fragments;
pub use split::{split_file, split_stream};
