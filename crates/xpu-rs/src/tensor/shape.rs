//! Lightweight wrapper for tensor shapes and dimension bookkeeping.

use smallvec::SmallVec;

/// Inline storage for per-dimension extents and strides.
pub type Dims = SmallVec<[usize; 4]>;

/// Stores the logical dimensions of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Dims,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    ///
    /// Panics if `dims` is empty, ensuring every tensor has at least one axis.
    pub fn new<D: AsRef<[usize]>>(dims: D) -> Self {
        let dims = dims.as_ref();
        assert!(!dims.is_empty(), "shape must have at least one dimension");
        Shape {
            dims: Dims::from_slice(dims),
        }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major strides in elements.
    pub fn contiguous_strides(&self) -> Dims {
        let mut strides = Dims::from_elem(0, self.dims.len());
        let mut running = 1usize;
        for (axis, &dim) in self.dims.iter().enumerate().rev() {
            strides[axis] = running;
            running = running.saturating_mul(dim.max(1));
        }
        strides
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}
