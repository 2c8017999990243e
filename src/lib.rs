//! ipspatch: IPS (International Patching System) patches in Rust.
//!
//! The crate provides:
//! - The IPS format: record codec, applier and encoder (`ips`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use ipspatch::ips;
//!
//! let original = b"hello old world";
//! let modified = b"hello new world";
//!
//! let mut patch = Vec::new();
//! ips::encode_all(&mut patch, original, modified).unwrap();
//! let patched = ips::apply_all(original, &patch).unwrap();
//! assert_eq!(patched, modified);
//! ```

pub mod io;
pub mod ips;

#[cfg(feature = "cli")]
pub mod cli;
