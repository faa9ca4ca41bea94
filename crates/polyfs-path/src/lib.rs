//! Virtual path utilities for polyfs.
//!
//! Virtual paths are `/`-separated strings, independent of the host OS.
//! Every backend canonicalizes through this crate before touching its
//! native store, so the rules here are the single source of truth for
//! what two paths "mean the same thing".
//!
//! This crate has **no internal polyfs dependencies**.
//!
//! | Function         | Purpose                                        |
//! |------------------|------------------------------------------------|
//! | [`normpath`]     | collapse `//`, `.` and `..`                    |
//! | [`join`]         | join two paths, later absolute paths win       |
//! | [`split`]        | `(dirname, basename)`                          |
//! | [`relpath`]      | strip leading `/`                              |
//! | [`abspath`]      | ensure leading `/`                             |
//! | [`is_prefix`]    | component-wise containment                     |
//! | [`is_same_dir`]  | same parent directory                          |
//! | [`Wildcard`]     | name-glob predicate for listings               |

mod path;
mod wildcard;

pub use path::{
    abspath, basename, components, dirname, is_prefix, is_root, is_same_dir, join, normpath,
    relpath, split, SEPARATOR,
};
pub use wildcard::{Wildcard, WildcardError};
