//! Batched copy engine: one kernel launch per batch of input descriptors.
//!
//! The host walks the inputs in batches, writes one [`CatInputDescriptor`] per input into a
//! staging buffer, and launches a 2-D nd-range whose second axis selects the input. Along the
//! first axis each work-item copies elements of its input with a grid-stride loop, mapping the
//! input's linear index to the output through [`OutputLayout::index_to_offset`].

use bytemuck::{Pod, Zeroable};
use xpu_rs::backend::spec::{BackendError, BackendResult};
use xpu_rs::tensor::Tensor;

use super::index::OutputLayout;
use crate::device::{Device, DevicePtr, LaunchError, NdRange2};

/// Per-input record consumed by one launch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct CatInputDescriptor {
    /// Device address of the input's first element.
    pub input: u64,
    /// Position of the input along the concatenation dimension of the output.
    pub offset: u32,
    pub dim_size: u32,
    pub n_elements: u32,
    pub _pad: u32,
}

/// Builds descriptors batch by batch, carrying the concatenation offset across batches.
#[derive(Debug)]
pub(crate) struct DescriptorBatcher {
    dim: usize,
    offset: u32,
}

impl DescriptorBatcher {
    pub(crate) fn new(dim: usize) -> Self {
        Self { dim, offset: 0 }
    }

    pub(crate) fn fill(
        &mut self,
        batch: &[Tensor],
        staging: &mut Vec<CatInputDescriptor>,
    ) -> BackendResult<()> {
        staging.clear();
        for tensor in batch {
            let dim_size = index_u32(tensor.size(self.dim))?;
            staging.push(CatInputDescriptor {
                input: tensor.data_ptr(),
                offset: self.offset,
                dim_size,
                n_elements: index_u32(tensor.numel())?,
                _pad: 0,
            });
            self.offset = self.offset.checked_add(dim_size).ok_or_else(|| {
                BackendError::execution("concatenation offset exceeds 32-bit index range")
            })?;
        }
        Ok(())
    }
}

fn index_u32(value: usize) -> BackendResult<u32> {
    u32::try_from(value)
        .map_err(|_| BackendError::execution(format!("{value} exceeds 32-bit index range")))
}

/// Copies `inputs` into `out` along `dim` with one launch per batch.
///
/// `out` must already have its final shape, every input must be dense in the output's
/// memory format and share its dtype.
pub fn copy_batched(
    device: &Device,
    out: &Tensor,
    inputs: &[Tensor],
    dim: usize,
    rank: usize,
    batch_capacity: usize,
) -> BackendResult<()> {
    match rank {
        1 => copy_ranked::<1>(device, out, inputs, dim, batch_capacity),
        2 => copy_ranked::<2>(device, out, inputs, dim, batch_capacity),
        3 => copy_ranked::<3>(device, out, inputs, dim, batch_capacity),
        other => Err(BackendError::unimplemented(
            "cat",
            format!("batched copy supports ranks 1 to 3, got {other}"),
        )),
    }
}

fn copy_ranked<const D: usize>(
    device: &Device,
    out: &Tensor,
    inputs: &[Tensor],
    dim: usize,
    batch_capacity: usize,
) -> BackendResult<()> {
    let layout = OutputLayout::<D>::capture(out)?;
    let element_size = out.element_size();
    let staging = device.alloc_staging::<CatInputDescriptor>(batch_capacity);
    let mut host = Vec::with_capacity(batch_capacity);
    let mut batcher = DescriptorBatcher::new(dim);
    let batches = inputs.len().div_ceil(batch_capacity);
    log::debug!(
        "cat batched: {} inputs in {batches} batches, rank {D}, {element_size}-byte elements",
        inputs.len()
    );

    for batch in inputs.chunks(batch_capacity) {
        batcher.fill(batch, &mut host)?;
        device.stage(&staging, &host)?;
        let descriptors = staging.device_slice(host.len())?;
        let launch = Launch {
            output: out.data_ptr(),
            descriptors,
            layout: &layout,
            dim,
        };
        match element_size {
            1 => launch.submit::<u8>(device)?,
            2 => launch.submit::<u16>(device)?,
            4 => launch.submit::<u32>(device)?,
            8 => launch.submit::<u64>(device)?,
            other => {
                return Err(BackendError::unimplemented(
                    "cat",
                    format!("no copy kernel for {other}-byte elements"),
                ))
            }
        }
    }
    Ok(())
}

struct Launch<'a, const D: usize> {
    output: u64,
    descriptors: &'a [CatInputDescriptor],
    layout: &'a OutputLayout<D>,
    dim: usize,
}

impl<const D: usize> Launch<'_, D> {
    fn submit<T: Pod>(&self, device: &Device) -> BackendResult<()> {
        let wg_size = device.max_work_group_size();
        let groups_x = (device.compute_units() / 2).max(1);
        let batch_len = u32::try_from(self.descriptors.len())
            .map_err(|_| BackendError::execution("descriptor batch too large"))?;
        let global_x = groups_x
            .checked_mul(wg_size)
            .ok_or(LaunchError::GlobalRangeOverflow {
                groups: groups_x,
                local: wg_size,
            })?;
        // x fills half the device; y selects the input.
        let range = NdRange2::new([global_x, batch_len], [wg_size, 1]);

        let output = DevicePtr::<T>::from_address(self.output);
        let dim_stride = self.layout.strides[self.dim];
        let (descriptors, layout, dim) = (self.descriptors, self.layout, self.dim);

        device.submit_2d(range, move |item| {
            let wg = item.get_local_range(0);
            let mut tid = item.get_group(0) * wg + item.get_local_id(0);
            let desc = &descriptors[item.get_group(1) as usize];
            if tid >= desc.n_elements {
                return;
            }
            let data = DevicePtr::<T>::from_address(desc.input);
            let data_offset = desc.offset * dim_stride;
            let stride = item.get_group_range(0) * wg;
            while tid < desc.n_elements {
                let element_offset = layout.index_to_offset(desc.dim_size, dim, tid);
                // SAFETY: the planner checked 32-bit indexability and that inputs do not alias
                // the output; each output element is written by exactly one work-item.
                unsafe {
                    output.write(
                        (data_offset + element_offset) as usize,
                        data.read(tid as usize),
                    );
                }
                tid = tid.saturating_add(stride);
            }
        })
    }
}
