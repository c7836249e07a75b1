use std::sync::Arc;

use half::{bf16, f16};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xpu_rs::backend::spec::{BackendError, SpecErrorCode, TensorBackend};
use xpu_rs::ops;
use xpu_rs::tensor::{DType, MemoryFormat, Tensor};
use xpu_rs_backend_ref_cpu::CpuBackend;

fn iota(shape: &[usize], start: i32) -> Tensor {
    let numel: usize = shape.iter().product();
    Tensor::from_vec(shape, (0..numel as i32).map(|v| v + start).collect()).unwrap()
}

fn spec_code(err: BackendError) -> SpecErrorCode {
    match err.spec_code() {
        Some(code) => code,
        None => panic!("expected a validation error, got {err}"),
    }
}

pub fn horizontal_concat_2x3_2x4<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let a = iota(&[2, 3], 0);
    let b = iota(&[2, 4], 100);
    let out = backend.cat(&[a, b], 1).unwrap();
    assert_eq!(out.dims(), &[2, 7]);
    assert_eq!(
        out.to_vec::<i32>().unwrap(),
        vec![0, 1, 2, 100, 101, 102, 103, 3, 4, 5, 104, 105, 106, 107]
    );
}

pub fn axis_extent_is_sum_of_inputs<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let mut rng = StdRng::seed_from_u64(11);
    let extents = [3usize, 1, 4, 2];
    let inputs: Vec<Tensor> = extents
        .iter()
        .map(|&n| {
            let data: Vec<f32> = (0..2 * n * 5).map(|_| rng.gen_range(-1.0..1.0)).collect();
            Tensor::from_vec([2, n, 5], data).unwrap()
        })
        .collect();
    let out = backend.cat(&inputs, 1).unwrap();
    assert_eq!(out.dims(), &[2, 10, 5]);

    let values = out.to_vec::<f32>().unwrap();
    let mut offset = 0;
    for input in &inputs {
        let n = input.size(1);
        let expected = input.to_vec::<f32>().unwrap();
        for batch in 0..2 {
            let got = &values[(batch * 10 + offset) * 5..(batch * 10 + offset + n) * 5];
            assert_eq!(got, &expected[batch * n * 5..(batch + 1) * n * 5]);
        }
        offset += n;
    }
}

pub fn skipped_inputs_are_ignored<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let inputs = [
        Tensor::undefined(DType::I32),
        iota(&[1, 2], 0),
        Tensor::undefined(DType::F64),
        iota(&[2, 2], 10),
        Tensor::undefined(DType::I32),
    ];
    let out = backend.cat(&inputs, 0).unwrap();
    assert_eq!(out.dtype(), DType::I32);
    assert_eq!(out.dims(), &[3, 2]);
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![0, 1, 10, 11, 12, 13]);
}

pub fn all_skipped_inputs_leave_output_alone<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let mut out = Tensor::from_vec([3], vec![1.0f32, 2.0, 3.0]).unwrap();
    let inputs = [Tensor::undefined(DType::F32), Tensor::undefined(DType::F32)];
    backend.cat_out(&mut out, &inputs, 0).unwrap();
    assert_eq!(out.dims(), &[3]);
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0]);
}

pub fn rejects_empty_input_list<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let err = backend.cat(&[], 0).unwrap_err();
    assert_eq!(spec_code(err), SpecErrorCode::InvalidInputCount);
}

pub fn shape_mismatch_leaves_output_untouched<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let mut out = Tensor::from_vec([2], vec![5.0f32, 6.0]).unwrap();
    let inputs = [
        Tensor::zeros([2, 3], DType::F32),
        Tensor::zeros([3, 3], DType::F32),
    ];
    let err = backend.cat_out(&mut out, &inputs, 1).unwrap_err();
    assert_eq!(spec_code(err), SpecErrorCode::ShapeMismatch);
    assert_eq!(out.dims(), &[2]);
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![5.0, 6.0]);

    let ranks = [Tensor::zeros([2, 3], DType::F32), Tensor::zeros([2], DType::F32)];
    let err = backend.cat(&ranks, 0).unwrap_err();
    assert_eq!(spec_code(err), SpecErrorCode::ShapeMismatch);
}

pub fn rejects_output_aliasing_an_input<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let base = iota(&[4, 2], 0);
    let before = base.to_vec::<i32>().unwrap();
    let inputs = [base.narrow(0, 0, 2).unwrap(), base.narrow(0, 2, 2).unwrap()];
    let mut out = base.clone();
    let err = backend.cat_out(&mut out, &inputs, 1).unwrap_err();
    assert_eq!(spec_code(err), SpecErrorCode::MemoryOverlap);
    assert_eq!(base.to_vec::<i32>().unwrap(), before);
}

pub fn rejects_out_of_range_dims<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let inputs = [iota(&[2, 2], 0), iota(&[2, 2], 4)];
    let err = backend.cat(&inputs, 2).unwrap_err();
    assert_eq!(spec_code(err), SpecErrorCode::InvalidDimension);
    let err = backend.cat(&inputs, -1).unwrap_err();
    assert_eq!(spec_code(err), SpecErrorCode::InvalidDimension);
}

pub fn negative_dim_wraps_at_dispatch<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let inputs = [iota(&[2, 1], 0), iota(&[2, 2], 10)];
    let out = ops::cat(backend.as_ref(), &inputs, -1).unwrap();
    assert_eq!(out.dims(), &[2, 3]);
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![0, 10, 11, 1, 12, 13]);

    let err = ops::cat(backend.as_ref(), &inputs, -3).unwrap_err();
    assert_eq!(spec_code(err), SpecErrorCode::InvalidDimension);
}

pub fn concat_into_reuses_sized_output<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let mut out = Tensor::zeros([5], DType::I32);
    let storage_id = out.storage().id();
    let inputs = [iota(&[2], 0), iota(&[3], 7)];
    let written = ops::cat_into(backend.as_ref(), &mut out, &inputs, 0).unwrap();
    assert_eq!(written.storage().id(), storage_id);
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![0, 1, 7, 8, 9]);
}

pub fn concat_spanning_multiple_batches<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let inputs: Vec<Tensor> = (0..1100)
        .map(|i| Tensor::from_vec([2, 1], vec![i, 10_000 + i]).unwrap())
        .collect();
    let out = backend.cat(&inputs, 1).unwrap();
    assert_eq!(out.dims(), &[2, 1100]);
    let values = out.to_vec::<i32>().unwrap();
    let expected: Vec<i32> = (0..1100).chain(10_000..11_100).collect();
    assert_eq!(values, expected);
}

pub fn uneven_inputs_across_three_batches<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let inputs: Vec<Tensor> = (0..2049i64)
        .map(|i| Tensor::from_vec([(i % 3) as usize + 1], vec![i; (i % 3) as usize + 1]).unwrap())
        .collect();
    let out = backend.cat(&inputs, 0).unwrap();
    let expected: Vec<i64> = (0..2049i64)
        .flat_map(|i| std::iter::repeat(i).take((i % 3) as usize + 1))
        .collect();
    assert_eq!(out.dims(), &[expected.len()]);
    assert_eq!(out.to_vec::<i64>().unwrap(), expected);
}

pub fn channels_last_inputs_match_row_major<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let a = iota(&[2, 3, 2], 0);
    let b = iota(&[2, 1, 2], 100);
    let expected = backend.cat(&[a.clone(), b.clone()], 1).unwrap();

    let inputs = [
        a.to_format(MemoryFormat::ChannelsLast),
        b.to_format(MemoryFormat::ChannelsLast),
    ];
    let out = backend.cat(&inputs, 1).unwrap();
    assert_eq!(out.dims(), &[2, 4, 2]);
    assert!(out.is_contiguous_in(MemoryFormat::ChannelsLast));
    assert_eq!(out.to_vec::<i32>().unwrap(), expected.to_vec::<i32>().unwrap());
    assert_eq!(
        out.to_vec::<i32>().unwrap(),
        vec![0, 1, 2, 3, 4, 5, 100, 101, 6, 7, 8, 9, 10, 11, 102, 103]
    );
}

pub fn permuted_inputs_are_copied_logically<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let source = iota(&[3, 2], 0);
    let transposed = source.permute(&[1, 0]).unwrap();
    let out = backend.cat(&[transposed, iota(&[2, 3], 50)], 0).unwrap();
    assert_eq!(out.dims(), &[4, 3]);
    assert_eq!(
        out.to_vec::<i32>().unwrap(),
        vec![0, 2, 4, 1, 3, 5, 50, 51, 52, 53, 54, 55]
    );
}

pub fn mixed_dtypes_promote<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ints = Tensor::from_vec([2], vec![1i32, 2]).unwrap();
    let floats = Tensor::from_vec([1], vec![0.5f32]).unwrap();
    let out = backend.cat(&[ints.clone(), floats.clone()], 0).unwrap();
    assert_eq!(out.dtype(), DType::F32);
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 0.5]);

    let mut wide = Tensor::zeros([0], DType::F64);
    backend.cat_out(&mut wide, &[ints, floats], 0).unwrap();
    assert_eq!(wide.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 0.5]);
}

pub fn rejects_uncastable_output<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let inputs = [
        Tensor::from_vec([1], vec![1.5f32]).unwrap(),
        Tensor::from_vec([1], vec![2.5f32]).unwrap(),
    ];
    let mut out = Tensor::zeros([0], DType::I32);
    let err = backend.cat_out(&mut out, &inputs, 0).unwrap_err();
    assert_eq!(spec_code(err), SpecErrorCode::DTypeNotCastable);
    assert_eq!(out.dims(), &[0]);
}

pub fn narrow_types_roundtrip<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let flags = [
        Tensor::from_bools([2], vec![true, false]).unwrap(),
        Tensor::from_bools([1], vec![true]).unwrap(),
    ];
    let out = backend.cat(&flags, 0).unwrap();
    assert_eq!(out.to_bools().unwrap(), vec![true, false, true]);

    let halves = [
        Tensor::from_vec([1, 2], vec![f16::from_f32(1.5), f16::from_f32(-2.0)]).unwrap(),
        Tensor::from_vec([1, 2], vec![f16::from_f32(0.25), f16::from_f32(8.0)]).unwrap(),
    ];
    let out = backend.cat(&halves, 0).unwrap();
    let values: Vec<f32> = out.to_vec::<f16>().unwrap().into_iter().map(f16::to_f32).collect();
    assert_eq!(values, vec![1.5, -2.0, 0.25, 8.0]);

    let brain_floats = [
        Tensor::from_vec([2], vec![bf16::from_f32(3.0), bf16::from_f32(4.0)]).unwrap(),
        Tensor::from_vec([1], vec![bf16::from_f32(5.0)]).unwrap(),
    ];
    let out = backend.cat(&brain_floats, 0).unwrap();
    assert_eq!(out.dtype(), DType::BF16);
    assert_eq!(out.to_vec::<bf16>().unwrap()[2], bf16::from_f32(5.0));
}

fn random_input(rng: &mut StdRng, dims: &[usize], dtype: DType) -> Tensor {
    let numel: usize = dims.iter().product();
    let mut bytes = vec![0u8; numel * dtype.size_in_bytes()];
    rng.fill(&mut bytes[..]);
    let rank = dims.len();
    if rank >= 2 && rng.gen_bool(0.3) {
        // Materialise with the last two axes swapped, then view it back.
        let mut swapped = dims.to_vec();
        swapped.swap(rank - 2, rank - 1);
        let mut order: Vec<usize> = (0..rank).collect();
        order.swap(rank - 2, rank - 1);
        return Tensor::from_bytes(swapped, dtype, &bytes)
            .unwrap()
            .permute(&order)
            .unwrap();
    }
    Tensor::from_bytes(dims, dtype, &bytes).unwrap()
}

pub fn matches_reference_backend<B: TensorBackend + 'static>(backend: &Arc<B>) {
    const DTYPES: [DType; 8] = [
        DType::U8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::F16,
        DType::BF16,
        DType::F32,
        DType::F64,
    ];
    let reference = CpuBackend::new();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for case in 0..48 {
        let rank = rng.gen_range(1..=4);
        let dim = rng.gen_range(0..rank);
        let dtype = DTYPES[rng.gen_range(0..DTYPES.len())];
        let base: Vec<usize> = (0..rank).map(|_| rng.gen_range(1..4)).collect();
        let count = rng.gen_range(1..6);
        let inputs: Vec<Tensor> = (0..count)
            .map(|_| {
                let mut dims = base.clone();
                dims[dim] = rng.gen_range(0..4);
                random_input(&mut rng, &dims, dtype)
            })
            .collect();

        let expected = reference.cat(&inputs, dim as i64).unwrap();
        let actual = backend.cat(&inputs, dim as i64).unwrap();
        assert_eq!(actual.dims(), expected.dims(), "case {case}: shape");
        assert_eq!(actual.dtype(), expected.dtype(), "case {case}: dtype");
        assert_eq!(actual.to_bytes(), expected.to_bytes(), "case {case}: values");
    }
}
