//! Ordered-collection diff algebra.
//!
//! A diff batch is an ordered list of [`VectorDiff`] operations delivered by
//! the upstream service. Applying a batch never mutates the input sequence:
//! operations are applied in order to one working copy, and only the final
//! sequence is handed back for publication.
//!
//! # Example
//!
//! ```
//! use room_mirror::diff::{apply_diff, VectorDiff};
//!
//! let current = vec![1, 2];
//! let batch = vec![
//!     VectorDiff::PushFront { value: 0 },
//!     VectorDiff::Remove { index: 2 },
//! ];
//! let next = apply_diff(&current, batch, Ok).unwrap();
//! assert_eq!(next, vec![0, 1]);
//! ```

mod operations;
mod types;

pub use operations::{apply_diff, apply_diff_async, apply_diff_with_replace};
pub use types::VectorDiff;
