//! Host-side tensor framework surface for accelerator backends.
//!
//! The crate owns the pieces every backend shares: dtypes and promotion rules, strided tensor
//! views over device-style storage, the generic strided copy primitive, memory-overlap
//! queries, the backend error taxonomy, and the dispatch entry points in [`ops`].

pub mod backend;
pub mod ops;
pub mod tensor;

pub use backend::spec::{BackendError, BackendResult, TensorBackend};
pub use tensor::{DType, MemoryFormat, Shape, Tensor};
