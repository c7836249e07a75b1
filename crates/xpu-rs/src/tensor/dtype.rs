//! Enumerates the scalar element types supported by tensor backends and their promotion rules.

use std::fmt;

/// Logical dtype identifier shared between tensors and backend kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// Boolean stored as one byte (0 or 1).
    Bool,
    /// 8-bit unsigned integer.
    U8,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer, primarily for index buffers.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 16-bit floating point with full mantissa (fp16).
    F16,
    /// 16-bit bfloat16 precision as used by many accelerators.
    BF16,
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 64-bit floating point.
    F64,
}

/// Coarse ordering used by the casting rules: values may only move up this ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DTypeCategory {
    Bool,
    Integral,
    Floating,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Bool | DType::U8 | DType::I8 => 1,
            DType::I16 | DType::F16 | DType::BF16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    pub fn category(self) -> DTypeCategory {
        match self {
            DType::Bool => DTypeCategory::Bool,
            DType::U8 | DType::I8 | DType::I16 | DType::I32 | DType::I64 => {
                DTypeCategory::Integral
            }
            DType::F16 | DType::BF16 | DType::F32 | DType::F64 => DTypeCategory::Floating,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::U8 => "u8",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the smallest dtype both operands promote to.
///
/// Bool yields to anything, integers widen (mixing `u8` with a signed type needs at least
/// `i16`), integers yield to floats, and the two 16-bit float formats meet at `f32`.
pub fn promote_types(a: DType, b: DType) -> DType {
    use DType::*;

    if a == b {
        return a;
    }
    match (a.category(), b.category()) {
        (DTypeCategory::Bool, _) => b,
        (_, DTypeCategory::Bool) => a,
        (DTypeCategory::Floating, DTypeCategory::Integral) => a,
        (DTypeCategory::Integral, DTypeCategory::Floating) => b,
        (DTypeCategory::Floating, DTypeCategory::Floating) => match (a, b) {
            (F16, BF16) | (BF16, F16) => F32,
            _ if a.size_in_bytes() >= b.size_in_bytes() => a,
            _ => b,
        },
        (DTypeCategory::Integral, DTypeCategory::Integral) => match (a, b) {
            (U8, other) | (other, U8) => {
                if other.size_in_bytes() > 1 {
                    other
                } else {
                    I16
                }
            }
            _ if a.size_in_bytes() >= b.size_in_bytes() => a,
            _ => b,
        },
    }
}

/// Whether values of `from` may be written into a tensor of `to` without a category downgrade.
pub fn can_cast(from: DType, to: DType) -> bool {
    from.category() <= to.category()
}

/// Folds [`promote_types`] over a sequence of dtypes; `None` for an empty sequence.
pub fn result_type<I>(dtypes: I) -> Option<DType>
where
    I: IntoIterator<Item = DType>,
{
    dtypes.into_iter().reduce(promote_types)
}
