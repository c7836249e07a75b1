use std::sync::{Arc, Once};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xpu_rs::backend::spec::{BackendError, TensorBackend};
use xpu_rs::tensor::{DType, MemoryFormat, Tensor};
use xpu_rs_backend_ref_cpu::CpuBackend;
use xpu_rs_backend_xpu::{CatConfig, CatStrategy, Device, DeviceConfig, XpuBackend};

static INIT_LOGGER: Once = Once::new();

fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn backend_with(config: DeviceConfig) -> XpuBackend {
    init_logger();
    XpuBackend::with_device(Device::new(config), CatConfig::default())
}

fn random_f32(rng: &mut StdRng, dims: &[usize]) -> anyhow::Result<Tensor> {
    let numel: usize = dims.iter().product();
    let data: Vec<f32> = (0..numel).map(|_| rng.gen_range(-4.0..4.0)).collect();
    Tensor::from_vec(dims, data)
}

#[test]
fn fused_path_issues_one_launch_per_batch() -> anyhow::Result<()> {
    let backend = backend_with(DeviceConfig::default());
    let inputs: Vec<Tensor> = (0..3000)
        .map(|i| Tensor::from_vec([1], vec![i as f32]))
        .collect::<anyhow::Result<_>>()?;
    let mut out = Tensor::zeros([0], DType::F32);

    let plan = backend.cat_out_planned(&mut out, &inputs, 0)?;
    assert_eq!(plan.strategy, CatStrategy::Fused { rank: 1 });
    assert_eq!(backend.device().submissions(), 3);
    assert_eq!(backend.device().transfers(), 3);

    let expected: Vec<f32> = (0..3000).map(|i| i as f32).collect();
    assert_eq!(out.to_vec::<f32>()?, expected);
    Ok(())
}

#[test]
fn fallback_path_issues_no_launches() -> anyhow::Result<()> {
    let backend = backend_with(DeviceConfig::default());
    let a = Tensor::from_vec([2, 2], vec![1.0f32, 2.0, 3.0, 4.0])?;
    let b = Tensor::from_vec([2, 1], vec![5i32, 6])?;
    let mut out = Tensor::zeros([0], DType::F64);

    let plan = backend.cat_out_planned(&mut out, &[a, b], 1)?;
    assert_eq!(plan.strategy, CatStrategy::Fallback);
    assert_eq!(backend.device().submissions(), 0);
    assert_eq!(out.to_vec::<f64>()?, vec![1.0, 2.0, 5.0, 3.0, 4.0, 6.0]);
    Ok(())
}

#[test]
fn channels_last_fused_equals_row_major_fallback() -> anyhow::Result<()> {
    let backend = backend_with(DeviceConfig::default());
    let mut rng = StdRng::seed_from_u64(3);
    let row_major = [
        random_f32(&mut rng, &[3, 4, 5])?,
        random_f32(&mut rng, &[3, 2, 5])?,
        random_f32(&mut rng, &[3, 7, 5])?,
    ];
    let channels_last: Vec<Tensor> = row_major
        .iter()
        .map(|t| t.to_format(MemoryFormat::ChannelsLast))
        .collect();

    let mut fused = Tensor::zeros([0], DType::F32);
    let plan = backend.cat_out_planned(&mut fused, &channels_last, 1)?;
    assert_eq!(plan.strategy, CatStrategy::Fused { rank: 3 });
    assert_eq!(plan.memory_format, MemoryFormat::ChannelsLast);

    let fallback = XpuBackend::with_device(
        Arc::clone(backend.device()),
        CatConfig {
            force_fallback: true,
            ..CatConfig::default()
        },
    );
    let reference = fallback.cat(&row_major, 1)?;
    assert_eq!(fused.dims(), &[3, 13, 5]);
    assert_eq!(fused.to_bytes(), reference.to_bytes());
    Ok(())
}

#[test]
fn permuted_output_is_restrided_before_launch() -> anyhow::Result<()> {
    let backend = backend_with(DeviceConfig::default());
    // A transposed 3x4 buffer is a column-major 4x3 view.
    let storage = Tensor::zeros([3, 4], DType::I32);
    let mut out = storage.permute(&[1, 0])?;
    let inputs = [
        Tensor::from_vec([1, 3], vec![1i32, 2, 3])?,
        Tensor::from_vec([3, 3], (10..19).collect::<Vec<i32>>())?,
    ];
    let plan = backend.cat_out_planned(&mut out, &inputs, 0)?;
    assert_eq!(plan.memory_format, MemoryFormat::Contiguous);
    assert_eq!(out.dims(), &[4, 3]);
    assert_eq!(out.strides(), &[3, 1]);
    assert_eq!(out.storage().id(), storage.storage().id());
    assert_eq!(
        out.to_vec::<i32>()?,
        vec![1, 2, 3, 10, 11, 12, 13, 14, 15, 16, 17, 18]
    );
    Ok(())
}

#[test]
fn matches_reference_on_large_random_inputs() -> anyhow::Result<()> {
    let backend = backend_with(DeviceConfig {
        compute_units: 4,
        max_work_group_size: 32,
        fail_after_submissions: None,
    });
    let mut rng = StdRng::seed_from_u64(99);
    let inputs: Vec<Tensor> = (0..40)
        .map(|_| {
            let rows = rng.gen_range(1..300);
            random_f32(&mut rng, &[rows, 17])
        })
        .collect::<anyhow::Result<_>>()?;

    let actual = backend.cat(&inputs, 0)?;
    let expected = CpuBackend::new().cat(&inputs, 0)?;
    assert_eq!(actual.dims(), expected.dims());
    assert_eq!(actual.to_bytes(), expected.to_bytes());
    Ok(())
}

#[test]
fn queue_failure_surfaces_as_execution_error() {
    let backend = backend_with(DeviceConfig {
        fail_after_submissions: Some(0),
        ..DeviceConfig::default()
    });
    let inputs = [Tensor::zeros([2], DType::U8), Tensor::zeros([3], DType::U8)];
    let err = backend.cat(&inputs, 0).unwrap_err();
    assert!(matches!(err, BackendError::Execution { .. }));
    assert!(err.to_string().contains("queue rejected"));
}

#[test]
fn registry_constructs_xpu_backend() {
    xpu_rs_backend_xpu::register_xpu_backend();
    let backend = xpu_rs::backend::registry::create_backend("xpu").expect("xpu registered");
    assert_eq!(backend.backend_name(), "xpu");
    assert!(XpuBackend::is_available());
    let out = backend
        .cat(&[Tensor::zeros([1, 2], DType::F32), Tensor::zeros([1, 2], DType::F32)], 0)
        .unwrap();
    assert_eq!(out.dims(), &[2, 2]);
}
