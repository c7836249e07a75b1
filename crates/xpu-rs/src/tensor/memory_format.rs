//! Physical dimension orderings a dense tensor may be laid out in.

use super::shape::Dims;

/// Dense layouts recognised by the framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryFormat {
    /// Row-major: the last logical dimension is innermost.
    #[default]
    Contiguous,
    /// Dimension 1 ("channels") innermost, remaining dimensions row-major around it.
    ///
    /// Only distinct from [`MemoryFormat::Contiguous`] for rank 3 and above.
    ChannelsLast,
}

impl MemoryFormat {
    /// Dimension indices ordered from outermost to innermost in memory.
    pub fn physical_order(self, rank: usize) -> Dims {
        match self {
            MemoryFormat::ChannelsLast if rank >= 3 => {
                let mut order: Dims = Dims::with_capacity(rank);
                order.push(0);
                order.extend(2..rank);
                order.push(1);
                order
            }
            _ => (0..rank).collect(),
        }
    }

    /// Dense strides, in elements, for `dims` laid out in this format.
    pub fn strides_for(self, dims: &[usize]) -> Dims {
        let order = self.physical_order(dims.len());
        let mut strides = Dims::from_elem(0, dims.len());
        let mut running = 1usize;
        for &axis in order.iter().rev() {
            strides[axis] = running;
            running = running.saturating_mul(dims[axis].max(1));
        }
        strides
    }
}

/// Checks that `strides` describe a dense, gap-free walk of `dims` in `order`.
///
/// Size-1 dimensions carry no information and are ignored; zero-element tensors are dense.
pub(crate) fn is_dense_in_order(dims: &[usize], strides: &[usize], order: &[usize]) -> bool {
    if dims.iter().any(|&d| d == 0) {
        return true;
    }
    let mut expected = 1usize;
    for &axis in order.iter().rev() {
        let size = dims[axis];
        if size == 1 {
            continue;
        }
        if strides[axis] != expected {
            return false;
        }
        expected = expected.saturating_mul(size);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_last_moves_dim_one_innermost() {
        assert_eq!(
            MemoryFormat::ChannelsLast.physical_order(4).as_slice(),
            &[0, 2, 3, 1]
        );
        assert_eq!(
            MemoryFormat::ChannelsLast.strides_for(&[2, 3, 5]).as_slice(),
            &[15, 1, 3]
        );
        assert_eq!(
            MemoryFormat::ChannelsLast.strides_for(&[4, 6]).as_slice(),
            &[6, 1]
        );
    }

    #[test]
    fn density_ignores_unit_dims() {
        let order = MemoryFormat::Contiguous.physical_order(3);
        assert!(is_dense_in_order(&[2, 1, 4], &[4, 99, 1], &order));
        assert!(!is_dense_in_order(&[2, 3, 4], &[24, 4, 1], &order));
        assert!(is_dense_in_order(&[2, 0, 4], &[7, 7, 7], &order));
    }
}
