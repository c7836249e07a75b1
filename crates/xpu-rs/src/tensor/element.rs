//! Element traits and the dtype-erased scalar used by converting copies.

use half::{bf16, f16};

use super::dtype::DType;

/// Plain-old-data element types that map one-to-one onto a [`DType`].
pub trait Element: bytemuck::Pod + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;
            }
        )*
    };
}

impl_element!(
    u8 => U8,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f16 => F16,
    bf16 => BF16,
    f32 => F32,
    f64 => F64,
);

/// A single value detached from its storage dtype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Scalar {
    /// Reads one element of `dtype` at `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `dtype.size_in_bytes()` bytes.
    pub unsafe fn read(dtype: DType, ptr: *const u8) -> Scalar {
        match dtype {
            DType::Bool => Scalar::Bool(ptr.read() != 0),
            DType::U8 => Scalar::Int(ptr.read() as i64),
            DType::I8 => Scalar::Int(ptr.cast::<i8>().read() as i64),
            DType::I16 => Scalar::Int(ptr.cast::<i16>().read_unaligned() as i64),
            DType::I32 => Scalar::Int(ptr.cast::<i32>().read_unaligned() as i64),
            DType::I64 => Scalar::Int(ptr.cast::<i64>().read_unaligned()),
            DType::F16 => Scalar::Float(ptr.cast::<f16>().read_unaligned().to_f64()),
            DType::BF16 => Scalar::Float(ptr.cast::<bf16>().read_unaligned().to_f64()),
            DType::F32 => Scalar::Float(ptr.cast::<f32>().read_unaligned() as f64),
            DType::F64 => Scalar::Float(ptr.cast::<f64>().read_unaligned()),
        }
    }

    /// Writes the value converted to `dtype` at `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid for writes of `dtype.size_in_bytes()` bytes.
    pub unsafe fn write(self, dtype: DType, ptr: *mut u8) {
        match dtype {
            DType::Bool => ptr.write(self.as_bool() as u8),
            DType::U8 => ptr.write(self.as_i64() as u8),
            DType::I8 => ptr.cast::<i8>().write(self.as_i64() as i8),
            DType::I16 => ptr.cast::<i16>().write_unaligned(self.as_i64() as i16),
            DType::I32 => ptr.cast::<i32>().write_unaligned(self.as_i64() as i32),
            DType::I64 => ptr.cast::<i64>().write_unaligned(self.as_i64()),
            DType::F16 => ptr
                .cast::<f16>()
                .write_unaligned(f16::from_f64(self.as_f64())),
            DType::BF16 => ptr
                .cast::<bf16>()
                .write_unaligned(bf16::from_f64(self.as_f64())),
            DType::F32 => ptr.cast::<f32>().write_unaligned(self.as_f64() as f32),
            DType::F64 => ptr.cast::<f64>().write_unaligned(self.as_f64()),
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            Scalar::Bool(v) => v,
            Scalar::Int(v) => v != 0,
            Scalar::Float(v) => v != 0.0,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Bool(v) => v as i64,
            Scalar::Int(v) => v,
            Scalar::Float(v) => v as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Bool(v) => v as u8 as f64,
            Scalar::Int(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }
}
