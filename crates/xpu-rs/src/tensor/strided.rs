//! Strided tensor views over shared device-style storage.

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, ensure, Result};

use super::dtype::DType;
use super::element::{Element, Scalar};
use super::memory_format::{is_dense_in_order, MemoryFormat};
use super::shape::{Dims, Shape};
use super::storage::Storage;

/// A logical tensor: dtype, extents and element strides over a shared [`Storage`].
///
/// Cloning a tensor or taking a view ([`Tensor::narrow`], [`Tensor::permute`]) shares the
/// underlying storage, so writes through one view are visible through every other.
#[derive(Clone)]
pub struct Tensor {
    storage: Arc<Storage>,
    storage_offset: usize,
    shape: Shape,
    strides: Dims,
    dtype: DType,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape.dims())
            .field("strides", &self.strides.as_slice())
            .field("storage_offset", &self.storage_offset)
            .field("storage", &self.storage.id())
            .finish()
    }
}

impl Tensor {
    /// Returns a zero-initialised row-major tensor.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self::zeros_with_format(shape, dtype, MemoryFormat::Contiguous)
    }

    /// Returns a zero-initialised tensor laid out densely in `format`.
    pub fn zeros_with_format(shape: impl Into<Shape>, dtype: DType, format: MemoryFormat) -> Self {
        let shape = shape.into();
        let strides = format.strides_for(shape.dims());
        let storage = Storage::zeroed(shape.num_elements() * dtype.size_in_bytes());
        Tensor {
            storage,
            storage_offset: 0,
            shape,
            strides,
            dtype,
        }
    }

    /// The legacy "undefined" tensor: rank 1, zero elements. Concatenation skips it.
    pub fn undefined(dtype: DType) -> Self {
        Self::zeros([0], dtype)
    }

    /// Constructs a row-major tensor from typed values, validating the length against the shape.
    pub fn from_vec<T: Element>(shape: impl Into<Shape>, data: Vec<T>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.num_elements() {
            bail!(
                "tensor data length ({}) does not match shape {:?}",
                data.len(),
                shape.dims()
            );
        }
        Self::from_bytes(shape, T::DTYPE, bytemuck::cast_slice(&data))
    }

    /// Constructs a row-major `Bool` tensor.
    pub fn from_bools(shape: impl Into<Shape>, data: Vec<bool>) -> Result<Self> {
        let bytes: Vec<u8> = data.into_iter().map(u8::from).collect();
        let shape = shape.into();
        ensure!(
            bytes.len() == shape.num_elements(),
            "tensor data length ({}) does not match shape {:?}",
            bytes.len(),
            shape.dims()
        );
        Self::from_bytes(shape, DType::Bool, &bytes)
    }

    /// Constructs a row-major tensor from raw little-endian element bytes.
    pub fn from_bytes(shape: impl Into<Shape>, dtype: DType, bytes: &[u8]) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.num_elements() * dtype.size_in_bytes();
        ensure!(
            bytes.len() == expected,
            "tensor payload has {} bytes, shape {:?} of {dtype} needs {expected}",
            bytes.len(),
            shape.dims()
        );
        Ok(Tensor {
            storage: Storage::from_bytes(bytes),
            storage_offset: 0,
            strides: shape.contiguous_strides(),
            shape,
            dtype,
        })
    }

    /// Creates a view with explicit extents, strides and storage offset over the same storage.
    pub fn as_strided(
        &self,
        shape: impl Into<Shape>,
        strides: &[usize],
        storage_offset: usize,
    ) -> Result<Tensor> {
        let shape = shape.into();
        ensure!(
            shape.rank() == strides.len(),
            "as_strided rank mismatch: shape {:?} vs strides {:?}",
            shape.dims(),
            strides
        );
        let view = Tensor {
            storage: Arc::clone(&self.storage),
            storage_offset,
            shape,
            strides: Dims::from_slice(strides),
            dtype: self.dtype,
        };
        if view.numel() > 0 {
            let end = (storage_offset + view.max_offset() + 1) * self.dtype.size_in_bytes();
            ensure!(
                end <= self.storage.bytes(),
                "as_strided view needs {end} bytes but storage holds {}",
                self.storage.bytes()
            );
        }
        Ok(view)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn size(&self, dim: usize) -> usize {
        self.shape.dims()[dim]
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn stride(&self, dim: usize) -> usize {
        self.strides[dim]
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn storage_offset(&self) -> usize {
        self.storage_offset
    }

    pub fn numel(&self) -> usize {
        self.shape.num_elements()
    }

    pub fn element_size(&self) -> usize {
        self.dtype.size_in_bytes()
    }

    /// Address of the first element, in the integer form kernels receive.
    pub fn data_ptr(&self) -> u64 {
        self.storage.device_ptr() + (self.storage_offset * self.element_size()) as u64
    }

    /// Whether concatenation treats this tensor as absent.
    pub fn is_skipped(&self) -> bool {
        self.rank() == 1 && self.numel() == 0
    }

    pub fn is_contiguous(&self) -> bool {
        self.is_contiguous_in(MemoryFormat::Contiguous)
    }

    pub fn is_contiguous_in(&self, format: MemoryFormat) -> bool {
        let order = format.physical_order(self.rank());
        is_dense_in_order(self.dims(), &self.strides, &order)
    }

    /// The dense layout this tensor most resembles; row-major wins ties.
    pub fn suggest_memory_format(&self) -> MemoryFormat {
        if self.rank() >= 3
            && !self.is_contiguous()
            && self.is_contiguous_in(MemoryFormat::ChannelsLast)
        {
            MemoryFormat::ChannelsLast
        } else {
            MemoryFormat::Contiguous
        }
    }

    /// True when the view covers a gap-free block with every element addressed exactly once,
    /// in any dimension order.
    pub fn is_non_overlapping_and_dense(&self) -> bool {
        if self.numel() == 0 {
            return true;
        }
        let mut axes: Dims = (0..self.rank()).filter(|&axis| self.size(axis) != 1).collect();
        axes.sort_by_key(|&axis| self.strides[axis]);
        let mut expected = 1usize;
        for &axis in &axes {
            if self.strides[axis] != expected {
                return false;
            }
            expected *= self.size(axis);
        }
        true
    }

    /// Largest element offset (relative to the storage offset) the view can address.
    pub fn max_offset(&self) -> usize {
        if self.numel() == 0 {
            return 0;
        }
        self.dims()
            .iter()
            .zip(self.strides.iter())
            .map(|(&size, &stride)| (size - 1) * stride)
            .sum()
    }

    /// Byte interval `[start, end)` of the storage the view can touch.
    pub fn byte_range(&self) -> (u64, u64) {
        let start = self.data_ptr();
        if self.numel() == 0 {
            return (start, start);
        }
        let len = (self.max_offset() + 1) * self.element_size();
        (start, start + len as u64)
    }

    /// Whether every element offset fits a signed 32-bit index.
    pub fn can_use_32bit_index_math(&self) -> bool {
        let limit = i32::MAX as usize;
        self.numel() <= limit && self.max_offset() < limit
    }

    /// Restricts `dim` to `[start, start + length)`, sharing storage.
    pub fn narrow(&self, dim: usize, start: usize, length: usize) -> Result<Tensor> {
        ensure!(
            dim < self.rank(),
            "narrow dimension {dim} out of range for rank {}",
            self.rank()
        );
        ensure!(
            start + length <= self.size(dim),
            "narrow range {start}..{} exceeds extent {} of dimension {dim}",
            start + length,
            self.size(dim)
        );
        let mut dims = Dims::from_slice(self.dims());
        dims[dim] = length;
        let storage_offset = if length == 0 {
            self.storage_offset
        } else {
            self.storage_offset + start * self.strides[dim]
        };
        Ok(Tensor {
            storage: Arc::clone(&self.storage),
            storage_offset,
            shape: Shape::new(dims),
            strides: self.strides.clone(),
            dtype: self.dtype,
        })
    }

    /// Reorders dimensions: output dimension `i` is input dimension `order[i]`.
    pub fn permute(&self, order: &[usize]) -> Result<Tensor> {
        ensure!(
            order.len() == self.rank(),
            "permute expects {} dimensions, got {:?}",
            self.rank(),
            order
        );
        let mut seen = vec![false; self.rank()];
        for &axis in order {
            ensure!(
                axis < self.rank() && !seen[axis],
                "permute order {order:?} is not a permutation"
            );
            seen[axis] = true;
        }
        let dims: Dims = order.iter().map(|&axis| self.size(axis)).collect();
        let strides: Dims = order.iter().map(|&axis| self.strides[axis]).collect();
        Ok(Tensor {
            storage: Arc::clone(&self.storage),
            storage_offset: self.storage_offset,
            shape: Shape::new(dims),
            strides,
            dtype: self.dtype,
        })
    }

    /// Returns a row-major tensor with the same values (shares storage if already row-major).
    pub fn contiguous(&self) -> Tensor {
        self.to_format(MemoryFormat::Contiguous)
    }

    /// Returns a tensor dense in `format` with the same values.
    pub fn to_format(&self, format: MemoryFormat) -> Tensor {
        if self.is_contiguous_in(format) {
            return self.clone();
        }
        let mut out = Tensor::zeros_with_format(self.shape.clone(), self.dtype, format);
        out.copy_unchecked(self);
        out
    }

    /// Re-strides the tensor densely in `format`, growing the storage when it is too small.
    ///
    /// Existing bytes are preserved when the storage grows; values are not re-laid out.
    pub fn resize_(&mut self, shape: impl Into<Shape>, format: MemoryFormat) {
        let shape = shape.into();
        let needed = (self.storage_offset + shape.num_elements()) * self.element_size();
        if needed > self.storage.bytes() {
            let grown = Storage::zeroed(needed);
            let old = self.storage.read_to_vec();
            // SAFETY: `grown` is larger than the old storage and not yet shared.
            unsafe { grown.write_bytes(0, &old) };
            self.storage = grown;
        }
        self.strides = format.strides_for(shape.dims());
        self.shape = shape;
    }

    /// The view [`Tensor::resize_`] would produce if it can reuse the current storage.
    pub fn resize_target(&self, shape: impl Into<Shape>, format: MemoryFormat) -> Option<Tensor> {
        let shape = shape.into();
        let needed = (self.storage_offset + shape.num_elements()) * self.element_size();
        if needed > self.storage.bytes() {
            return None;
        }
        Some(Tensor {
            storage: Arc::clone(&self.storage),
            storage_offset: self.storage_offset,
            strides: format.strides_for(shape.dims()),
            shape,
            dtype: self.dtype,
        })
    }

    /// Generic strided copy: writes `src` into `self` element by element, converting dtype.
    ///
    /// Shapes must match exactly. `src` and `self` must not overlap.
    pub fn copy_(&mut self, src: &Tensor) -> Result<()> {
        ensure!(
            self.dims() == src.dims(),
            "copy_ shape mismatch: destination {:?}, source {:?}",
            self.dims(),
            src.dims()
        );
        self.copy_unchecked(src);
        Ok(())
    }

    fn copy_unchecked(&mut self, src: &Tensor) {
        if self.numel() == 0 {
            return;
        }
        let dst_size = self.element_size();
        let src_size = src.element_size();
        let dst_base = self.element_ptr(0);
        let src_base = src.element_ptr(0);

        if self.dtype == src.dtype && self.is_contiguous() && src.is_contiguous() {
            // SAFETY: both views are dense and in bounds of their storages.
            unsafe { std::ptr::copy(src_base, dst_base, self.numel() * dst_size) };
            return;
        }

        let same_dtype = self.dtype == src.dtype;
        let (dst_dtype, src_dtype) = (self.dtype, src.dtype);
        for_each_offset_pair(self.dims(), &self.strides, &src.strides, |dst, src_off| {
            // SAFETY: offsets are produced from in-bounds coordinates of both views.
            unsafe {
                let d = dst_base.add(dst * dst_size);
                let s = src_base.add(src_off * src_size);
                if same_dtype {
                    std::ptr::copy(s, d, dst_size);
                } else {
                    Scalar::read(src_dtype, s).write(dst_dtype, d);
                }
            }
        });
    }

    /// Returns the element bytes in row-major logical order.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.contiguous().dense_bytes()
    }

    /// Reads the values in row-major logical order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        ensure!(
            T::DTYPE == self.dtype,
            "to_vec requested {} from a {} tensor",
            T::DTYPE,
            self.dtype
        );
        Ok(self
            .to_bytes()
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    pub fn to_bools(&self) -> Result<Vec<bool>> {
        ensure!(
            self.dtype == DType::Bool,
            "to_bools requested from a {} tensor",
            self.dtype
        );
        Ok(self.to_bytes().into_iter().map(|b| b != 0).collect())
    }

    fn dense_bytes(&self) -> Vec<u8> {
        let len = self.numel() * self.element_size();
        let mut out = vec![0u8; len];
        if len != 0 {
            // SAFETY: caller guarantees the view is row-major dense and in bounds.
            unsafe { std::ptr::copy_nonoverlapping(self.element_ptr(0), out.as_mut_ptr(), len) };
        }
        out
    }

    fn element_ptr(&self, offset: usize) -> *mut u8 {
        // SAFETY: pointer arithmetic stays within the allocation for in-bounds views.
        unsafe {
            self.storage
                .as_ptr()
                .add((self.storage_offset + offset) * self.element_size())
        }
    }
}

/// Walks every coordinate of `dims` in row-major order, yielding the element offsets the
/// coordinate maps to under two stride vectors.
pub(crate) fn for_each_offset_pair<F>(dims: &[usize], a_strides: &[usize], b_strides: &[usize], mut f: F)
where
    F: FnMut(usize, usize),
{
    let numel: usize = dims.iter().product();
    if numel == 0 {
        return;
    }
    let rank = dims.len();
    let mut index = Dims::from_elem(0, rank);
    let (mut a, mut b) = (0usize, 0usize);
    for _ in 0..numel {
        f(a, b);
        for axis in (0..rank).rev() {
            index[axis] += 1;
            a += a_strides[axis];
            b += b_strides[axis];
            if index[axis] < dims[axis] {
                break;
            }
            a -= a_strides[axis] * dims[axis];
            b -= b_strides[axis] * dims[axis];
            index[axis] = 0;
        }
    }
}
