//! Recording acquisition module
//!
//! Decodes uploaded EEG containers (EDF / EDF+) into [`crate::types::Recording`].

pub mod edf;

pub use edf::{decode as decode_edf, encode as encode_edf, parse_header, EdfError, EdfHeader};
