//! Linear-index to element-offset mapping for the fused copy kernel.

use xpu_rs::backend::spec::{BackendError, BackendResult};
use xpu_rs::tensor::Tensor;

/// Output geometry captured once per launch, in 32-bit index arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout<const D: usize> {
    pub sizes: [u32; D],
    pub strides: [u32; D],
    /// Dimensions from outermost to innermost in memory.
    pub order: [usize; D],
}

impl<const D: usize> OutputLayout<D> {
    pub fn capture(out: &Tensor) -> BackendResult<Self> {
        if out.rank() != D {
            return Err(BackendError::execution(format!(
                "output layout of rank {D} captured from a rank-{} tensor",
                out.rank()
            )));
        }
        let mut sizes = [0u32; D];
        let mut strides = [0u32; D];
        for axis in 0..D {
            sizes[axis] = to_u32(out.size(axis), "size")?;
            strides[axis] = to_u32(out.stride(axis), "stride")?;
        }
        Ok(Self::from_parts(sizes, strides))
    }

    /// Derives the decomposition order from stride magnitude.
    ///
    /// For rank 2 this is the `stride[0] > stride[1]` test; a permuted (column-major)
    /// output decomposes dimension 0 first.
    pub fn from_parts(sizes: [u32; D], strides: [u32; D]) -> Self {
        let mut order: [usize; D] = std::array::from_fn(|axis| axis);
        order.sort_by(|&a, &b| strides[b].cmp(&strides[a]));
        Self {
            sizes,
            strides,
            order,
        }
    }

    /// Offset in the output, relative to the input's slab start, of the input's `linear`-th
    /// element.
    ///
    /// `dim_size` replaces the output extent along `concat_dim`, so the decomposition walks the
    /// input's own shape in the output's memory order.
    #[inline]
    pub fn index_to_offset(&self, dim_size: u32, concat_dim: usize, mut linear: u32) -> u32 {
        let mut offset = 0u32;
        for &axis in self.order[1..].iter().rev() {
            let extent = if axis == concat_dim {
                dim_size
            } else {
                self.sizes[axis]
            };
            let next = linear / extent;
            offset += (linear - extent * next) * self.strides[axis];
            linear = next;
        }
        offset + linear * self.strides[self.order[0]]
    }
}

fn to_u32(value: usize, what: &str) -> BackendResult<u32> {
    u32::try_from(value).map_err(|_| {
        BackendError::execution(format!("output {what} {value} exceeds 32-bit index range"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpu_rs::tensor::{DType, MemoryFormat};

    #[test]
    fn row_major_slabs_follow_logical_order() {
        // Output 2x7 filled from a 2x3 input placed at column 0.
        let layout = OutputLayout::<2>::from_parts([2, 7], [7, 1]);
        assert_eq!(layout.order, [0, 1]);
        let offsets: Vec<u32> = (0..6).map(|i| layout.index_to_offset(3, 1, i)).collect();
        assert_eq!(offsets, vec![0, 1, 2, 7, 8, 9]);
    }

    #[test]
    fn permuted_rank2_decomposes_dimension_zero_first() {
        // Column-major 4x3 output; input of 2 rows concatenated along dim 0.
        let layout = OutputLayout::<2>::from_parts([4, 3], [1, 4]);
        assert_eq!(layout.order, [1, 0]);
        let offsets: Vec<u32> = (0..6).map(|i| layout.index_to_offset(2, 0, i)).collect();
        assert_eq!(offsets, vec![0, 1, 4, 5, 8, 9]);
    }

    #[test]
    fn channels_last_rank3_walks_channels_innermost() {
        let out = Tensor::zeros_with_format([2, 5, 3], DType::F32, MemoryFormat::ChannelsLast);
        let layout = OutputLayout::<3>::capture(&out).unwrap();
        assert_eq!(layout.strides, [15, 1, 5]);
        assert_eq!(layout.order, [0, 2, 1]);
        // An input with 2 channels: elements are laid out (n, l, c) with c innermost.
        let offsets: Vec<u32> = (0..4).map(|i| layout.index_to_offset(2, 1, i)).collect();
        assert_eq!(offsets, vec![0, 1, 5, 6]);
        assert_eq!(layout.index_to_offset(2, 1, 6), 15);
    }

    #[test]
    fn rank1_is_a_scaled_index() {
        let layout = OutputLayout::<1>::from_parts([10], [1]);
        assert_eq!(layout.index_to_offset(4, 0, 3), 3);
    }

    #[test]
    fn capture_rejects_rank_mismatch() {
        let out = Tensor::zeros([2, 2], DType::F32);
        assert!(OutputLayout::<3>::capture(&out).is_err());
    }
}
