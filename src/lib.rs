//!
//! Protofs decodes arbitrary protocol buffer messages based on .proto-files
//! supplied at runtime and presents them as a read-only directory tree. Each
//! message becomes a directory, each scalar field a file holding the value as
//! text and each instance of a repeated field its own `name_N` entry.
//!
//! Decoding is strict: the first malformed or unexpected value aborts the
//! decode with a [`DecodeError`](decode::DecodeError).
//!
//! ```
//! use protofs::{decode, Context};
//!
//! let context = Context::parse(&[r#"
//!   syntax = "proto3";
//!   package Proto;
//!
//!   enum Kind { PERCH = 0; PIKE = 1; }
//!   message Fish { string name = 1; Kind kind = 2; repeated int32 fins = 3; }
//! "#]).unwrap();
//!
//! let tree = decode(&[b"\x0a\x05Perch\x10\x01\x1a\x02\x03\x04"], "Proto.Fish", &context).unwrap();
//! assert_eq!(tree.lookup("name").unwrap().as_leaf().unwrap().text(), "Perch");
//! assert_eq!(tree.lookup("kind").unwrap().as_leaf().unwrap().text(), "PIKE");
//! assert_eq!(tree.lookup("fins_2").unwrap().as_leaf().unwrap().text(), "4");
//!
//! let fish = context.get_message("Proto.Fish").unwrap();
//! let err = fish.decode(b"\x10\x07", &context).unwrap_err();
//! assert_eq!(err.to_string(), "Unknown value 7 for enum 'Proto.Kind'");
//! ```
#![warn(missing_docs)]
#![allow(clippy::match_bool)]

pub mod context;
pub mod decode;
pub mod mount;
pub mod tree;

pub use context::Context;
pub use decode::{decode, DecodeError, DecodeOptions, Decoder};
pub use tree::{Directory, Leaf, Node, ValueTree};
