//! Concatenation along one dimension.
//!
//! [`cat_out`] validates and plans the request ([`plan_and_validate`]), resizes the output,
//! then runs either the batched engine or the per-input fallback copy.

mod batched;
mod fallback;
mod index;
mod plan;

use xpu_rs::backend::spec::BackendResult;
use xpu_rs::tensor::Tensor;

use crate::device::Device;

pub use batched::{copy_batched, CatInputDescriptor};
pub use fallback::copy_fallback;
pub use index::OutputLayout;
pub use plan::{
    plan_and_validate, CatConfig, CatPlan, CatStrategy, CAT_ARRAY_BATCH_SIZE,
    CAT_ARRAY_MAX_INPUT_DIMS,
};

/// Concatenates `inputs` along `dim` into `out` and returns the plan that was executed.
///
/// Validation failures leave `out` untouched. A device failure after earlier batches have
/// completed leaves those batches written.
pub fn cat_out(
    device: &Device,
    config: &CatConfig,
    out: &mut Tensor,
    inputs: &[Tensor],
    dim: i64,
) -> BackendResult<CatPlan> {
    let plan = plan_and_validate(out, inputs, dim, config)?;
    let Some(shape) = plan.output_shape.clone() else {
        return Ok(plan);
    };
    out.resize_(shape, plan.memory_format);

    match plan.strategy {
        CatStrategy::Fused { rank } => copy_batched(
            device,
            out,
            inputs,
            plan.dim,
            rank,
            config.effective_batch_capacity(),
        )?,
        CatStrategy::Fallback => copy_fallback(out, inputs, plan.dim)?,
        CatStrategy::Noop => {}
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceConfig;
    use xpu_rs::backend::spec::BackendError;
    use xpu_rs::tensor::DType;

    #[test]
    fn fused_and_fallback_agree() {
        let device = Device::new(DeviceConfig::default());
        let inputs: Vec<Tensor> = (1..=4)
            .map(|n| Tensor::from_vec([2, n], (0..2 * n as i64).collect::<Vec<_>>()).unwrap())
            .collect();

        let mut fused = Tensor::zeros([0], DType::I64);
        let plan = cat_out(&device, &CatConfig::default(), &mut fused, &inputs, 1).unwrap();
        assert_eq!(plan.strategy, CatStrategy::Fused { rank: 2 });

        let forced = CatConfig {
            force_fallback: true,
            ..CatConfig::default()
        };
        let mut slow = Tensor::zeros([0], DType::I64);
        let plan = cat_out(&device, &forced, &mut slow, &inputs, 1).unwrap();
        assert_eq!(plan.strategy, CatStrategy::Fallback);

        assert_eq!(fused.dims(), &[2, 10]);
        assert_eq!(fused.to_bytes(), slow.to_bytes());
    }

    #[test]
    fn validation_failure_leaves_output_untouched() {
        let device = Device::new(DeviceConfig::default());
        let mut out = Tensor::from_vec([3], vec![7.0f32, 8.0, 9.0]).unwrap();
        let inputs = [Tensor::zeros([2, 3], DType::F32), Tensor::zeros([3, 2], DType::F32)];
        let err = cat_out(&device, &CatConfig::default(), &mut out, &inputs, 0).unwrap_err();
        assert!(err.spec_code().is_some());
        assert_eq!(out.dims(), &[3]);
        assert_eq!(out.to_vec::<f32>().unwrap(), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn noop_keeps_existing_output() {
        let device = Device::new(DeviceConfig::default());
        let mut out = Tensor::from_vec([2], vec![1u8, 2]).unwrap();
        let inputs = [Tensor::undefined(DType::U8)];
        let plan = cat_out(&device, &CatConfig::default(), &mut out, &inputs, 0).unwrap();
        assert_eq!(plan.strategy, CatStrategy::Noop);
        assert_eq!(out.to_vec::<u8>().unwrap(), vec![1, 2]);
    }

    #[test]
    fn submission_failure_keeps_completed_batches() {
        let device = Device::new(DeviceConfig {
            fail_after_submissions: Some(1),
            ..DeviceConfig::default()
        });
        let config = CatConfig {
            batch_capacity: 2,
            ..CatConfig::default()
        };
        let inputs: Vec<Tensor> = (0..4)
            .map(|v| Tensor::from_vec([1], vec![v as i32 + 1]).unwrap())
            .collect();
        let mut out = Tensor::zeros([0], DType::I32);
        let err = cat_out(&device, &config, &mut out, &inputs, 0).unwrap_err();
        assert!(matches!(err, BackendError::Execution { .. }));
        assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 2, 0, 0]);
    }
}
