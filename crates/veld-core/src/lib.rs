//! Low-level building blocks shared across the Veld runtime.
//!
//! This crate contains:
//! - Alignment arithmetic used by layout computation (`align`)
//! - A self-describing aligned allocator (`alloc`)
//! - Zeroed stack-or-heap scratch buffers for temporary values (`scratch`)

pub mod align;
pub mod alloc;
pub mod scratch;

pub use align::{is_aligned, round_up};
pub use alloc::{aligned_alloc, aligned_free};
pub use scratch::Scratch;
