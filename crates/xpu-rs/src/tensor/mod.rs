//! Core tensor abstractions shared across backends.
//!
//! The tensor module defines shapes, dtypes, memory formats, device-style storage, and the
//! strided [`Tensor`] view type backends read from and write into. It also hosts the generic
//! strided copy primitive ([`Tensor::copy_`]) and the memory-overlap queries kernels use to
//! reject aliasing outputs.

pub mod dtype;
pub mod element;
pub mod memory_format;
pub mod overlap;
pub mod shape;
pub mod storage;
mod strided;

pub use dtype::{can_cast, promote_types, result_type, DType, DTypeCategory};
pub use element::{Element, Scalar};
pub use memory_format::MemoryFormat;
pub use overlap::{get_overlap_status, has_internal_overlap, MemOverlap, MemOverlapStatus};
pub use shape::{Dims, Shape};
pub use storage::Storage;
pub use strided::Tensor;
