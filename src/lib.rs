#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Error types surfaced by table construction, insertion, and resizing.
pub mod error;

/// A key-value map implementation over the Robin Hood table.
///
/// This module provides a `RobinMap` that wraps the `RobinTable` and
/// provides a standard map interface with configurable hashers and automatic
/// growth.
pub mod map;

pub mod table;

pub use error::CapacityError;
pub use error::ResizeError;
pub use error::TableFull;
pub use map::RobinMap;
pub use table::RobinTable;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The default hasher builder used by [`RobinMap`].
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The default hasher builder used by [`RobinMap`].
        pub type DefaultHashBuilder = std::collections::hash_map::RandomState;
    } else {
        /// Placeholder hasher builder used when neither the `foldhash` nor
        /// the `std` feature is enabled; supply a hasher builder explicitly
        /// via `RobinMap::with_hasher`.
        pub type DefaultHashBuilder = ();
    }
}
