use xpu_rs::backend::spec::{BackendError, BackendResult};
use xpu_rs::tensor::Tensor;

/// Copies each non-skipped input into its slab of `out` with a strided, converting copy.
///
/// Handles any rank, layout and dtype combination the planner accepts.
pub fn copy_fallback(out: &Tensor, inputs: &[Tensor], dim: usize) -> BackendResult<()> {
    let mut offset = 0usize;
    for input in inputs.iter().filter(|tensor| !tensor.is_skipped()) {
        let extent = input.size(dim);
        let mut slab = out
            .narrow(dim, offset, extent)
            .map_err(|err| BackendError::execution(format!("cat fallback: {err:#}")))?;
        slab.copy_(input)
            .map_err(|err| BackendError::execution(format!("cat fallback: {err:#}")))?;
        offset += extent;
    }
    log::trace!("cat fallback filled {offset} positions along dim {dim}");
    Ok(())
}
