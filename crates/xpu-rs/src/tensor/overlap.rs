//! Memory-overlap queries between tensor views.

use super::strided::Tensor;

/// Whether a single view addresses any element more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOverlap {
    No,
    Yes,
    TooHard,
}

/// Relationship between the byte ranges of two views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOverlapStatus {
    /// Both views cover exactly the same bytes.
    Full,
    /// The views share some, but not all, bytes.
    Partial,
    No,
    /// At least one view is not dense, so byte ranges are not conclusive.
    TooHard,
}

pub fn has_internal_overlap(tensor: &Tensor) -> MemOverlap {
    if tensor.is_non_overlapping_and_dense() {
        return MemOverlap::No;
    }
    let repeats = tensor
        .dims()
        .iter()
        .zip(tensor.strides())
        .any(|(&size, &stride)| size > 1 && stride == 0);
    if repeats {
        MemOverlap::Yes
    } else {
        MemOverlap::TooHard
    }
}

pub fn get_overlap_status(a: &Tensor, b: &Tensor) -> MemOverlapStatus {
    if a.numel() == 0 || b.numel() == 0 {
        return MemOverlapStatus::No;
    }
    if !a.is_non_overlapping_and_dense() || !b.is_non_overlapping_and_dense() {
        return MemOverlapStatus::TooHard;
    }
    if a.storage().id() != b.storage().id() {
        return MemOverlapStatus::No;
    }
    let (a_start, a_end) = a.byte_range();
    let (b_start, b_end) = b.byte_range();
    if a_start == b_start && a_end == b_end {
        MemOverlapStatus::Full
    } else if a_start < b_end && b_start < a_end {
        MemOverlapStatus::Partial
    } else {
        MemOverlapStatus::No
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DType;

    #[test]
    fn classifies_shared_storage_ranges() {
        let base = Tensor::zeros([4, 4], DType::F32);
        let top = base.narrow(0, 0, 2).unwrap();
        let bottom = base.narrow(0, 2, 2).unwrap();
        let middle = base.narrow(0, 1, 2).unwrap();
        let other = Tensor::zeros([4, 4], DType::F32);

        assert_eq!(get_overlap_status(&base, &base.clone()), MemOverlapStatus::Full);
        assert_eq!(get_overlap_status(&top, &bottom), MemOverlapStatus::No);
        assert_eq!(get_overlap_status(&top, &middle), MemOverlapStatus::Partial);
        assert_eq!(get_overlap_status(&base, &other), MemOverlapStatus::No);
        assert_eq!(
            get_overlap_status(&base.narrow(1, 0, 2).unwrap(), &base),
            MemOverlapStatus::TooHard
        );
    }

    #[test]
    fn zero_strides_are_internal_overlap() {
        let base = Tensor::zeros([4], DType::F32);
        let broadcast = base.as_strided([3, 4], &[0, 1], 0).unwrap();
        assert_eq!(has_internal_overlap(&broadcast), MemOverlap::Yes);
        assert_eq!(has_internal_overlap(&base), MemOverlap::No);
        let strided = base.as_strided([2], &[2], 0).unwrap();
        assert_eq!(has_internal_overlap(&strided), MemOverlap::TooHard);
    }
}
