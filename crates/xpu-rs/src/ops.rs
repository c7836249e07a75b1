//! Operator entry points: normalise arguments, then dispatch to a backend.

use crate::backend::spec::{BackendError, BackendResult, SpecErrorCode, TensorBackend};
use crate::tensor::Tensor;

/// Maps a possibly negative dimension into `0..rank`.
pub fn wrap_dim(dim: i64, rank: usize) -> BackendResult<i64> {
    let rank = rank.max(1) as i64;
    if dim < -rank || dim >= rank {
        return Err(BackendError::spec(
            SpecErrorCode::InvalidDimension,
            format!("dimension {dim} out of range for rank {rank}"),
        ));
    }
    Ok(if dim < 0 { dim + rank } else { dim })
}

/// Rank concatenation wraps `dim` against: the first input that is not skipped.
fn cat_rank(inputs: &[Tensor]) -> usize {
    inputs
        .iter()
        .find(|tensor| !tensor.is_skipped())
        .map(Tensor::rank)
        .unwrap_or(1)
}

/// `concat(inputs, dim) -> Tensor`.
pub fn cat<B>(backend: &B, inputs: &[Tensor], dim: i64) -> BackendResult<Tensor>
where
    B: TensorBackend + ?Sized,
{
    let dim = wrap_dim(dim, cat_rank(inputs))?;
    log::trace!(
        "dispatch cat: backend={} inputs={} dim={dim}",
        backend.backend_name(),
        inputs.len()
    );
    backend.cat(inputs, dim)
}

/// `concat_into(out, inputs, dim) -> &mut Tensor`.
pub fn cat_into<'a, B>(
    backend: &B,
    out: &'a mut Tensor,
    inputs: &[Tensor],
    dim: i64,
) -> BackendResult<&'a mut Tensor>
where
    B: TensorBackend + ?Sized,
{
    let dim = wrap_dim(dim, cat_rank(inputs))?;
    log::trace!(
        "dispatch cat_out: backend={} inputs={} dim={dim}",
        backend.backend_name(),
        inputs.len()
    );
    backend.cat_out(out, inputs, dim)?;
    Ok(out)
}
