use xpu_rs::backend::spec::{BackendError, BackendResult, SpecErrorCode, TensorBackend};
use xpu_rs::tensor::{
    can_cast, get_overlap_status, has_internal_overlap, result_type, Dims, MemOverlap,
    MemOverlapStatus, Tensor,
};

/// Straightforward host implementation used as the correctness reference for device backends.
///
/// Every input is materialised row-major in the output dtype, then slabs are interleaved with
/// an outer/inner chunk copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl TensorBackend for CpuBackend {
    fn backend_name(&self) -> &str {
        "cpu"
    }

    fn cat_out(&self, out: &mut Tensor, inputs: &[Tensor], dim: i64) -> BackendResult<()> {
        op_concat(out, inputs, dim)
    }
}

fn aliasing(detail: String) -> BackendError {
    BackendError::spec(SpecErrorCode::MemoryOverlap, detail)
}

fn ensure_disjoint(out: &Tensor, inputs: &[Tensor]) -> BackendResult<()> {
    for (idx, input) in inputs.iter().enumerate() {
        if matches!(
            get_overlap_status(out, input),
            MemOverlapStatus::Full | MemOverlapStatus::Partial
        ) {
            return Err(aliasing(format!("input {idx} overlaps the output")));
        }
    }
    Ok(())
}

fn op_concat(out: &mut Tensor, inputs: &[Tensor], dim: i64) -> BackendResult<()> {
    if inputs.is_empty() {
        return Err(BackendError::spec(
            SpecErrorCode::InvalidInputCount,
            "concat expects at least one input".to_string(),
        ));
    }
    let live: Vec<&Tensor> = inputs.iter().filter(|t| !t.is_skipped()).collect();

    if let Some(dtype) = result_type(live.iter().map(|t| t.dtype())) {
        if !can_cast(dtype, out.dtype()) {
            return Err(BackendError::spec(
                SpecErrorCode::DTypeNotCastable,
                format!("cannot cast {dtype} into {}", out.dtype()),
            ));
        }
    }
    ensure_disjoint(out, inputs)?;
    if has_internal_overlap(out) == MemOverlap::Yes {
        return Err(aliasing("output has internal overlap".to_string()));
    }

    let Some(first) = live.first() else {
        return Ok(());
    };
    let rank = first.rank();
    if dim < 0 || dim as usize >= rank {
        return Err(BackendError::spec(
            SpecErrorCode::InvalidDimension,
            format!("concat axis {dim} out of range for rank {rank}"),
        ));
    }
    let axis = dim as usize;

    let mut out_dims = Dims::from_slice(first.dims());
    out_dims[axis] = 0;
    for tensor in &live {
        let matches = tensor.rank() == rank
            && (0..rank).all(|d| d == axis || tensor.size(d) == first.size(d));
        if !matches {
            return Err(BackendError::spec(
                SpecErrorCode::ShapeMismatch,
                format!(
                    "concat dimension mismatch: {:?} vs {:?} on axis {axis}",
                    first.dims(),
                    tensor.dims()
                ),
            ));
        }
        out_dims[axis] += tensor.size(axis);
    }

    let format = inputs[0].suggest_memory_format();
    if let Some(target) = out.resize_target(out_dims.as_slice(), format) {
        ensure_disjoint(&target, inputs)?;
    }

    let elem = out.dtype().size_in_bytes();
    let axis_inner = out_dims.iter().skip(axis + 1).product::<usize>() * elem;
    let outer = out_dims.iter().take(axis).product::<usize>();
    let stride_outer = out_dims[axis] * axis_inner;

    let mut inputs_info = Vec::with_capacity(live.len());
    for tensor in &live {
        let mut staged = Tensor::zeros(tensor.shape().clone(), out.dtype());
        staged
            .copy_(tensor)
            .map_err(|err| BackendError::execution(format!("concat staging failed: {err:#}")))?;
        inputs_info.push((tensor.size(axis), staged.to_bytes()));
    }

    let mut result = vec![0u8; outer * stride_outer];
    for outer_idx in 0..outer {
        let mut dst_offset = outer_idx * stride_outer;
        for (axis_dim, data) in &inputs_info {
            let chunk = axis_dim * axis_inner;
            let src_start = outer_idx * chunk;
            result[dst_offset..dst_offset + chunk]
                .copy_from_slice(&data[src_start..src_start + chunk]);
            dst_offset += chunk;
        }
    }

    let dense = Tensor::from_bytes(out_dims.as_slice(), out.dtype(), &result)
        .map_err(|err| BackendError::execution(format!("concat result: {err:#}")))?;
    out.resize_(out_dims.as_slice(), format);
    out.copy_(&dense)
        .map_err(|err| BackendError::execution(format!("concat writeback failed: {err:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpu_rs::tensor::DType;

    #[test]
    fn interleaves_rows_for_inner_axis() {
        let a = Tensor::from_vec([2, 2], vec![1i32, 2, 3, 4]).unwrap();
        let b = Tensor::from_vec([2, 1], vec![9i32, 8]).unwrap();
        let out = CpuBackend.cat(&[a, b], 1).unwrap();
        assert_eq!(out.dims(), &[2, 3]);
        assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 2, 9, 3, 4, 8]);
    }

    #[test]
    fn converts_into_wider_output() {
        let a = Tensor::from_vec([2], vec![1u8, 2]).unwrap();
        let b = Tensor::from_vec([1], vec![-3i16]).unwrap();
        let mut out = Tensor::zeros([0], DType::I64);
        CpuBackend.cat_out(&mut out, &[a, b], 0).unwrap();
        assert_eq!(out.to_vec::<i64>().unwrap(), vec![1, 2, -3]);
    }
}
