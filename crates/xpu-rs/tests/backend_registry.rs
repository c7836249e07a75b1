use std::sync::{Arc, Mutex};

use xpu_rs::backend::registry::{create_backend, has_backend, list_backends, register_backend};
use xpu_rs::backend::spec::{BackendResult, SpecErrorCode, TensorBackend};
use xpu_rs::ops;
use xpu_rs::tensor::{DType, Tensor};

/// Records the dims it receives and writes nothing.
#[derive(Default)]
struct RecordingBackend {
    dims: Mutex<Vec<i64>>,
}

impl TensorBackend for RecordingBackend {
    fn backend_name(&self) -> &str {
        "recording"
    }

    fn cat_out(&self, _out: &mut Tensor, _inputs: &[Tensor], dim: i64) -> BackendResult<()> {
        self.dims.lock().unwrap().push(dim);
        Ok(())
    }
}

#[test]
fn registered_backends_are_constructible_by_name() {
    register_backend("recording-test", RecordingBackend::default);
    assert!(has_backend("recording-test"));
    assert!(list_backends().contains(&"recording-test".to_string()));
    let backend = create_backend("recording-test").expect("registered");
    assert_eq!(backend.backend_name(), "recording");
    assert!(create_backend("does-not-exist").is_none());
}

#[test]
fn dispatch_wraps_negative_dims_against_first_live_input() {
    let backend = Arc::new(RecordingBackend::default());
    let inputs = [
        Tensor::undefined(DType::F32),
        Tensor::zeros([2, 3, 4], DType::F32),
    ];
    ops::cat(backend.as_ref(), &inputs, -1).unwrap();
    let mut out = Tensor::zeros([0], DType::F32);
    ops::cat_into(backend.as_ref(), &mut out, &inputs, -3).unwrap();
    assert_eq!(*backend.dims.lock().unwrap(), vec![2, 0]);

    let err = ops::cat(backend.as_ref(), &inputs, 3).unwrap_err();
    assert_eq!(err.spec_code(), Some(SpecErrorCode::InvalidDimension));
}

#[test]
fn default_cat_allocates_promoted_dtype() {
    let backend = RecordingBackend::default();
    let inputs = [
        Tensor::zeros([2], DType::I16),
        Tensor::zeros([2], DType::BF16),
    ];
    let out = backend.cat(&inputs, 0).unwrap();
    assert_eq!(out.dtype(), DType::BF16);
    assert_eq!(out.dims(), &[0]);
}
