use xpu_rs::backend::spec::{BackendError, BackendResult, SpecErrorCode};
use xpu_rs::tensor::{
    can_cast, get_overlap_status, has_internal_overlap, result_type, Dims, MemOverlap,
    MemOverlapStatus, MemoryFormat, Shape, Tensor,
};

use crate::env;

/// Inputs per kernel launch of the batched engine.
pub const CAT_ARRAY_BATCH_SIZE: usize = 1024;
/// Highest output rank the batched engine handles.
pub const CAT_ARRAY_MAX_INPUT_DIMS: usize = 3;

/// Tuning knobs for concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatConfig {
    /// Descriptors staged per launch; values above [`CAT_ARRAY_BATCH_SIZE`] are clamped.
    pub batch_capacity: usize,
    /// Highest rank routed to the batched engine; clamped to [`CAT_ARRAY_MAX_INPUT_DIMS`].
    pub max_fused_rank: usize,
    pub force_fallback: bool,
}

impl Default for CatConfig {
    fn default() -> Self {
        Self {
            batch_capacity: CAT_ARRAY_BATCH_SIZE,
            max_fused_rank: CAT_ARRAY_MAX_INPUT_DIMS,
            force_fallback: false,
        }
    }
}

impl CatConfig {
    /// Defaults with `XPU_CAT_FORCE_FALLBACK` applied.
    pub fn from_env() -> Self {
        Self {
            force_fallback: env::cat_force_fallback(),
            ..Self::default()
        }
    }

    pub(crate) fn effective_batch_capacity(&self) -> usize {
        self.batch_capacity.clamp(1, CAT_ARRAY_BATCH_SIZE)
    }

    fn effective_max_rank(&self) -> usize {
        self.max_fused_rank.min(CAT_ARRAY_MAX_INPUT_DIMS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatStrategy {
    /// Every input is skipped; the output is left as it is.
    Noop,
    /// Batched descriptor-driven kernel, specialised on output rank.
    Fused { rank: usize },
    /// Per-input narrow plus strided copy.
    Fallback,
}

/// Validated description of one concatenation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatPlan {
    pub dim: usize,
    /// Shape the output is resized to; `None` for [`CatStrategy::Noop`].
    pub output_shape: Option<Shape>,
    pub memory_format: MemoryFormat,
    pub strategy: CatStrategy,
    pub has_skipped_input: bool,
}

impl CatPlan {
    fn noop(dim: i64, has_skipped_input: bool) -> Self {
        Self {
            dim: dim.max(0) as usize,
            output_shape: None,
            memory_format: MemoryFormat::Contiguous,
            strategy: CatStrategy::Noop,
            has_skipped_input,
        }
    }
}

fn overlap_error(index: usize) -> BackendError {
    BackendError::spec(
        SpecErrorCode::MemoryOverlap,
        format!("found overlap in input tensor {index}"),
    )
}

fn check_no_overlap(result: &Tensor, inputs: &[Tensor]) -> BackendResult<()> {
    for (index, input) in inputs.iter().enumerate() {
        if matches!(
            get_overlap_status(result, input),
            MemOverlapStatus::Full | MemOverlapStatus::Partial
        ) {
            return Err(overlap_error(index));
        }
    }
    Ok(())
}

fn check_shape_except_dim(
    reference: &Tensor,
    tensor: &Tensor,
    dim: usize,
    index: usize,
) -> BackendResult<()> {
    if reference.rank() != tensor.rank() {
        return Err(BackendError::spec(
            SpecErrorCode::ShapeMismatch,
            format!(
                "tensors must have same number of dimensions: got {} and {} for tensor number {index}",
                reference.rank(),
                tensor.rank()
            ),
        ));
    }
    for axis in (0..reference.rank()).filter(|&axis| axis != dim) {
        if reference.size(axis) != tensor.size(axis) {
            return Err(BackendError::spec(
                SpecErrorCode::ShapeMismatch,
                format!(
                    "expected size {} but got size {} for tensor number {index} in dimension {axis}",
                    reference.size(axis),
                    tensor.size(axis)
                ),
            ));
        }
    }
    Ok(())
}

/// Validates a concatenation of `inputs` along `dim` into `result` and chooses a strategy.
///
/// Never mutates `result`; every validation error is reported before device work starts.
pub fn plan_and_validate(
    result: &Tensor,
    inputs: &[Tensor],
    dim: i64,
    config: &CatConfig,
) -> BackendResult<CatPlan> {
    if inputs.is_empty() {
        return Err(BackendError::spec(
            SpecErrorCode::InvalidInputCount,
            "cat expects at least one tensor".to_string(),
        ));
    }

    let live = || inputs.iter().enumerate().filter(|(_, t)| !t.is_skipped());

    if let Some(promoted) = result_type(live().map(|(_, t)| t.dtype())) {
        if !can_cast(promoted, result.dtype()) {
            return Err(BackendError::spec(
                SpecErrorCode::DTypeNotCastable,
                format!(
                    "input type {promoted} can't be cast to the desired output type {}",
                    result.dtype()
                ),
            ));
        }
    }

    check_no_overlap(result, inputs)?;
    if has_internal_overlap(result) == MemOverlap::Yes {
        return Err(BackendError::spec(
            SpecErrorCode::MemoryOverlap,
            "output tensor has internal overlap".to_string(),
        ));
    }

    let has_skipped_input = inputs.iter().any(Tensor::is_skipped);
    let Some((_, reference)) = live().last() else {
        log::debug!("cat: all {} inputs skipped, nothing to do", inputs.len());
        return Ok(CatPlan::noop(dim, has_skipped_input));
    };

    let rank = reference.rank();
    if dim < 0 || dim as usize >= rank {
        return Err(BackendError::spec(
            SpecErrorCode::InvalidDimension,
            format!("dimension {dim} out of range for rank {rank}"),
        ));
    }
    let dim = dim as usize;

    let mut cat_dim_size = 0usize;
    for (index, tensor) in live() {
        check_shape_except_dim(reference, tensor, dim, index)?;
        cat_dim_size += tensor.size(dim);
    }
    let mut dims = Dims::from_slice(reference.dims());
    dims[dim] = cat_dim_size;
    let output_shape = Shape::new(dims);
    let memory_format = inputs[0].suggest_memory_format();

    if let Some(target) = result.resize_target(output_shape.clone(), memory_format) {
        check_no_overlap(&target, inputs)?;
    }

    let eligible = !config.force_fallback
        && inputs.len() > 1
        && !has_skipped_input
        && rank <= config.effective_max_rank()
        && output_shape.num_elements() <= i32::MAX as usize
        && inputs.iter().all(|t| t.is_contiguous_in(memory_format))
        && inputs.iter().all(Tensor::can_use_32bit_index_math)
        && inputs.iter().all(|t| t.dtype() == result.dtype());
    let strategy = if eligible {
        CatStrategy::Fused { rank }
    } else {
        CatStrategy::Fallback
    };
    log::debug!(
        "cat plan: {} inputs dim={dim} shape={:?} format={memory_format:?} strategy={strategy:?}",
        inputs.len(),
        output_shape.dims()
    );

    Ok(CatPlan {
        dim,
        output_shape: Some(output_shape),
        memory_format,
        strategy,
        has_skipped_input,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpu_rs::tensor::DType;

    fn plan(result: &Tensor, inputs: &[Tensor], dim: i64) -> BackendResult<CatPlan> {
        plan_and_validate(result, inputs, dim, &CatConfig::default())
    }

    fn code(err: BackendError) -> SpecErrorCode {
        err.spec_code().expect("validation error")
    }

    #[test]
    fn plans_fused_concat_of_contiguous_inputs() {
        let inputs = [
            Tensor::zeros([2, 3], DType::F32),
            Tensor::zeros([2, 4], DType::F32),
        ];
        let out = Tensor::zeros([0], DType::F32);
        let plan = plan(&out, &inputs, 1).unwrap();
        assert_eq!(plan.output_shape, Some(Shape::new([2, 7])));
        assert_eq!(plan.strategy, CatStrategy::Fused { rank: 2 });
        assert_eq!(plan.memory_format, MemoryFormat::Contiguous);
    }

    #[test]
    fn disqualifiers_route_to_fallback() {
        let out = Tensor::zeros([0], DType::F32);
        let single = [Tensor::zeros([2, 3], DType::F32)];
        assert_eq!(plan(&out, &single, 0).unwrap().strategy, CatStrategy::Fallback);

        let with_skip = [
            Tensor::zeros([2, 3], DType::F32),
            Tensor::undefined(DType::F32),
            Tensor::zeros([2, 3], DType::F32),
        ];
        let skipped = plan(&out, &with_skip, 0).unwrap();
        assert_eq!(skipped.strategy, CatStrategy::Fallback);
        assert!(skipped.has_skipped_input);
        assert_eq!(skipped.output_shape, Some(Shape::new([4, 3])));

        let rank4 = [
            Tensor::zeros([1, 2, 2, 2], DType::F32),
            Tensor::zeros([1, 2, 2, 2], DType::F32),
        ];
        assert_eq!(plan(&out, &rank4, 0).unwrap().strategy, CatStrategy::Fallback);

        let mixed = [
            Tensor::zeros([2], DType::F32),
            Tensor::zeros([2], DType::F16),
        ];
        assert_eq!(plan(&out, &mixed, 0).unwrap().strategy, CatStrategy::Fallback);

        let base = Tensor::zeros([3, 2], DType::F32);
        let transposed = [base.permute(&[1, 0]).unwrap(), Tensor::zeros([2, 3], DType::F32)];
        assert_eq!(plan(&out, &transposed, 0).unwrap().strategy, CatStrategy::Fallback);

        let forced = CatConfig {
            force_fallback: true,
            ..CatConfig::default()
        };
        let pair = [Tensor::zeros([2], DType::F32), Tensor::zeros([3], DType::F32)];
        assert_eq!(
            plan_and_validate(&out, &pair, 0, &forced).unwrap().strategy,
            CatStrategy::Fallback
        );
    }

    #[test]
    fn channels_last_inputs_keep_their_format() {
        let inputs = [
            Tensor::zeros_with_format([2, 3, 4], DType::F32, MemoryFormat::ChannelsLast),
            Tensor::zeros_with_format([2, 5, 4], DType::F32, MemoryFormat::ChannelsLast),
        ];
        let out = Tensor::zeros([0], DType::F32);
        let plan = plan(&out, &inputs, 1).unwrap();
        assert_eq!(plan.memory_format, MemoryFormat::ChannelsLast);
        assert_eq!(plan.strategy, CatStrategy::Fused { rank: 3 });
        assert_eq!(plan.output_shape, Some(Shape::new([2, 8, 4])));
    }

    #[test]
    fn rejects_invalid_requests() {
        let out = Tensor::zeros([0], DType::F32);
        assert_eq!(code(plan(&out, &[], 0).unwrap_err()), SpecErrorCode::InvalidInputCount);

        let pair = [Tensor::zeros([2, 3], DType::F32), Tensor::zeros([2, 4], DType::F32)];
        assert_eq!(code(plan(&out, &pair, -1).unwrap_err()), SpecErrorCode::InvalidDimension);
        assert_eq!(code(plan(&out, &pair, 2).unwrap_err()), SpecErrorCode::InvalidDimension);
        assert_eq!(code(plan(&out, &pair, 0).unwrap_err()), SpecErrorCode::ShapeMismatch);

        let ranks = [Tensor::zeros([2, 3], DType::F32), Tensor::zeros([2, 3, 1], DType::F32)];
        assert_eq!(code(plan(&out, &ranks, 0).unwrap_err()), SpecErrorCode::ShapeMismatch);

        let int_out = Tensor::zeros([0], DType::I32);
        assert_eq!(
            code(plan(&int_out, &pair, 1).unwrap_err()),
            SpecErrorCode::DTypeNotCastable
        );
    }

    #[test]
    fn rejects_outputs_aliasing_inputs() {
        let base = Tensor::zeros([4, 3], DType::F32);
        let inputs = [base.narrow(0, 0, 2).unwrap(), Tensor::zeros([2, 3], DType::F32)];
        let err = plan(&base, &inputs, 0).unwrap_err();
        assert_eq!(code(err), SpecErrorCode::MemoryOverlap);

        // An empty output view whose resize would reuse the input's bytes.
        let prospective = base.narrow(0, 0, 0).unwrap();
        let err = plan(&prospective, &inputs, 0).unwrap_err();
        assert_eq!(code(err), SpecErrorCode::MemoryOverlap);

        let broadcast = Tensor::zeros([1], DType::F32)
            .as_strided([4], &[0], 0)
            .unwrap();
        let pair = [Tensor::zeros([2], DType::F32), Tensor::zeros([2], DType::F32)];
        assert_eq!(
            code(plan(&broadcast, &pair, 0).unwrap_err()),
            SpecErrorCode::MemoryOverlap
        );
    }

    #[test]
    fn all_skipped_inputs_plan_a_noop() {
        let out = Tensor::zeros([5], DType::F32);
        let inputs = [Tensor::undefined(DType::F32), Tensor::undefined(DType::F32)];
        let plan = plan(&out, &inputs, 0).unwrap();
        assert_eq!(plan.strategy, CatStrategy::Noop);
        assert_eq!(plan.output_shape, None);
    }
}
