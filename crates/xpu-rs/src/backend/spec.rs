//! Backend-facing contract: the error taxonomy and the operator dispatch trait.

use std::fmt;

use crate::tensor::{result_type, DType, Tensor};

/// Stable identifiers for validation failures detected before any device work is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecErrorCode {
    InvalidInputCount,
    InvalidDimension,
    ShapeMismatch,
    MemoryOverlap,
    DTypeNotCastable,
}

impl SpecErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecErrorCode::InvalidInputCount => "SpecError: invalid number of inputs",
            SpecErrorCode::InvalidDimension => "SpecError: invalid dimension",
            SpecErrorCode::ShapeMismatch => {
                "SpecError: sizes of tensors must match except in the concatenation dimension"
            }
            SpecErrorCode::MemoryOverlap => {
                "SpecError: input tensors cannot refer to any of the output memory locations"
            }
            SpecErrorCode::DTypeNotCastable => {
                "SpecError: input types can't be cast to the desired output type"
            }
        }
    }
}

/// Validation failure captured before execution.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecError {
    pub code: SpecErrorCode,
    pub detail: Option<String>,
}

impl SpecError {
    pub fn new(code: SpecErrorCode, detail: impl Into<Option<String>>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.code.as_str()),
            None => write!(f, "{}", self.code.as_str()),
        }
    }
}

impl std::error::Error for SpecError {}

/// Backend error surfaced to higher layers.
#[derive(Debug)]
pub enum BackendError {
    SpecViolation(SpecError),
    Unimplemented { op: &'static str, reason: String },
    Execution { message: String },
}

impl BackendError {
    pub fn spec(code: SpecErrorCode, detail: impl Into<Option<String>>) -> Self {
        BackendError::SpecViolation(SpecError::new(code, detail))
    }

    pub fn unimplemented(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }

    /// The validation code, if this is a spec violation.
    pub fn spec_code(&self) -> Option<SpecErrorCode> {
        match self {
            BackendError::SpecViolation(err) => Some(err.code),
            _ => None,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::SpecViolation(err) => write!(f, "{err}"),
            BackendError::Unimplemented { op, reason } => {
                write!(f, "{op} is not implemented: {reason}")
            }
            BackendError::Execution { message } => {
                write!(f, "backend execution failure: {message}")
            }
        }
    }
}

impl std::error::Error for BackendError {}

/// Convenience alias for results returned by backend routines.
pub type BackendResult<T> = Result<T, BackendError>;

/// Operator surface a device backend plugs into.
///
/// `dim` arrives already wrapped by the dispatch layer ([`crate::ops`]); backends reject
/// negative values themselves.
pub trait TensorBackend: Send + Sync {
    /// Returns a human-readable backend identifier (e.g., `"cpu"`, `"xpu"`).
    fn backend_name(&self) -> &str;

    /// Concatenates `inputs` along `dim` into `out`, resizing it as needed.
    fn cat_out(&self, out: &mut Tensor, inputs: &[Tensor], dim: i64) -> BackendResult<()>;

    /// Out-of-place concatenation into a fresh tensor of the inputs' common dtype.
    fn cat(&self, inputs: &[Tensor], dim: i64) -> BackendResult<Tensor> {
        let dtype = cat_result_type(inputs)?;
        let mut out = Tensor::zeros([0], dtype);
        self.cat_out(&mut out, inputs, dim)?;
        Ok(out)
    }
}

/// Common dtype of the non-skipped inputs, falling back to the first input's dtype.
pub fn cat_result_type(inputs: &[Tensor]) -> BackendResult<DType> {
    let first = inputs.first().ok_or_else(|| {
        BackendError::spec(
            SpecErrorCode::InvalidInputCount,
            "cat expects at least one tensor".to_string(),
        )
    })?;
    Ok(result_type(
        inputs
            .iter()
            .filter(|tensor| !tensor.is_skipped())
            .map(Tensor::dtype),
    )
    .unwrap_or(first.dtype()))
}
