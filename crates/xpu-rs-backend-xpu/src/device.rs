//! Work-queue device model the kernels of this backend are submitted to.
//!
//! The device exposes the three primitives concatenation needs: device-visible allocations,
//! host-to-device staging copies, and 2-D nd-range kernel launches. Submissions on one device
//! are serialised in FIFO order; inside a launch, work-groups run concurrently on a `rayon`
//! pool and work-items within a group run in order.

use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use bytemuck::Pod;
use rayon::prelude::*;
use thiserror::Error;
use xpu_rs::backend::spec::{BackendError, BackendResult};
use xpu_rs::tensor::Storage;

use crate::env;

pub const DEFAULT_COMPUTE_UNITS: u32 = 16;
pub const DEFAULT_MAX_WORK_GROUP_SIZE: u32 = 256;

/// Static properties of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub compute_units: u32,
    pub max_work_group_size: u32,
    /// Reject kernel submissions once this many have been accepted.
    ///
    /// Models a queue that stops accepting work part-way through an operation.
    pub fail_after_submissions: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            compute_units: DEFAULT_COMPUTE_UNITS,
            max_work_group_size: DEFAULT_MAX_WORK_GROUP_SIZE,
            fail_after_submissions: None,
        }
    }
}

impl DeviceConfig {
    /// Defaults overridden by `XPU_COMPUTE_UNITS` / `XPU_MAX_WORK_GROUP_SIZE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            compute_units: env::compute_units().unwrap_or(defaults.compute_units),
            max_work_group_size: env::max_work_group_size()
                .unwrap_or(defaults.max_work_group_size),
            fail_after_submissions: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("local range {local:?} contains a zero extent")]
    EmptyWorkGroup { local: [u32; 2] },
    #[error("global range {global:?} is not a multiple of local range {local:?}")]
    UnalignedGlobalRange { global: [u32; 2], local: [u32; 2] },
    #[error("work-group of {size} items exceeds the device limit of {limit}")]
    WorkGroupTooLarge { size: u64, limit: u32 },
    #[error("{groups} work-groups of {local} items overflow a 32-bit global range")]
    GlobalRangeOverflow { groups: u32, local: u32 },
    #[error("staging copy of {items} items overruns a buffer of capacity {capacity}")]
    StagingOverrun { items: usize, capacity: usize },
    #[error("queue rejected submission #{submission}")]
    QueueRejected { submission: u64 },
}

impl From<LaunchError> for BackendError {
    fn from(err: LaunchError) -> Self {
        BackendError::execution(format!("xpu device: {err}"))
    }
}

/// Global and local extents of a 2-D launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange2 {
    pub global: [u32; 2],
    pub local: [u32; 2],
}

impl NdRange2 {
    pub fn new(global: [u32; 2], local: [u32; 2]) -> Self {
        Self { global, local }
    }

    fn validate(&self, limit: u32) -> Result<[u32; 2], LaunchError> {
        if self.local.contains(&0) {
            return Err(LaunchError::EmptyWorkGroup { local: self.local });
        }
        if self.global[0] % self.local[0] != 0 || self.global[1] % self.local[1] != 0 {
            return Err(LaunchError::UnalignedGlobalRange {
                global: self.global,
                local: self.local,
            });
        }
        let size = self.local[0] as u64 * self.local[1] as u64;
        if size > limit as u64 {
            return Err(LaunchError::WorkGroupTooLarge { size, limit });
        }
        Ok([
            self.global[0] / self.local[0],
            self.global[1] / self.local[1],
        ])
    }
}

/// Identity of one work-item inside a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdItem {
    group: [u32; 2],
    local_id: [u32; 2],
    local_range: [u32; 2],
    group_range: [u32; 2],
}

impl NdItem {
    #[inline]
    pub fn get_group(&self, dim: usize) -> u32 {
        self.group[dim]
    }

    #[inline]
    pub fn get_local_id(&self, dim: usize) -> u32 {
        self.local_id[dim]
    }

    #[inline]
    pub fn get_local_range(&self, dim: usize) -> u32 {
        self.local_range[dim]
    }

    #[inline]
    pub fn get_group_range(&self, dim: usize) -> u32 {
        self.group_range[dim]
    }

    #[inline]
    pub fn get_global_id(&self, dim: usize) -> u32 {
        self.group[dim] * self.local_range[dim] + self.local_id[dim]
    }
}

/// Typed device address handed to kernels.
#[derive(Clone, Copy)]
pub struct DevicePtr<T> {
    ptr: *mut T,
}

// SAFETY: a device pointer is an address; kernels guarantee disjoint writes per element.
unsafe impl<T> Send for DevicePtr<T> {}
// SAFETY: see above.
unsafe impl<T> Sync for DevicePtr<T> {}

impl<T> fmt::Debug for DevicePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePtr({:p})", self.ptr)
    }
}

impl<T: Copy> DevicePtr<T> {
    pub fn from_address(address: u64) -> Self {
        Self {
            ptr: address as usize as *mut T,
        }
    }

    /// # Safety
    /// `index` must address an initialised element of the allocation.
    #[inline]
    pub unsafe fn read(self, index: usize) -> T {
        self.ptr.add(index).read_unaligned()
    }

    /// # Safety
    /// `index` must lie inside the allocation and no other work-item may write it concurrently.
    #[inline]
    pub unsafe fn write(self, index: usize, value: T) {
        self.ptr.add(index).write_unaligned(value)
    }
}

/// Fixed-capacity device-visible array of plain-old-data records.
pub struct StagingBuffer<T> {
    storage: Arc<Storage>,
    capacity: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> StagingBuffer<T> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn device_ptr(&self) -> u64 {
        self.storage.device_ptr()
    }

    /// Device-side view of the first `len` staged records.
    pub fn device_slice(&self, len: usize) -> BackendResult<&[T]> {
        if len > self.capacity {
            return Err(LaunchError::StagingOverrun {
                items: len,
                capacity: self.capacity,
            }
            .into());
        }
        // SAFETY: the storage holds `capacity * size_of::<T>()` initialised bytes and lives as
        // long as `self`.
        let bytes =
            unsafe { std::slice::from_raw_parts(self.storage.as_ptr(), len * size_of::<T>()) };
        bytemuck::try_cast_slice(bytes)
            .map_err(|err| BackendError::execution(format!("staging buffer cast failed: {err}")))
    }
}

pub struct Device {
    config: DeviceConfig,
    queue: Mutex<()>,
    submissions: AtomicU64,
    transfers: AtomicU64,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("config", &self.config)
            .field("submissions", &self.submissions())
            .finish()
    }
}

static XPU_DEVICE: OnceLock<Arc<Device>> = OnceLock::new();

/// The process-wide default device, configured from the environment on first use.
pub fn device() -> Arc<Device> {
    Arc::clone(XPU_DEVICE.get_or_init(|| Device::new(DeviceConfig::from_env())))
}

pub fn is_available() -> bool {
    true
}

impl Device {
    pub fn new(config: DeviceConfig) -> Arc<Self> {
        log::info!(
            "xpu device initialised: {} compute units, work-group limit {}",
            config.compute_units,
            config.max_work_group_size
        );
        Arc::new(Self {
            config,
            queue: Mutex::new(()),
            submissions: AtomicU64::new(0),
            transfers: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn compute_units(&self) -> u32 {
        self.config.compute_units
    }

    pub fn max_work_group_size(&self) -> u32 {
        self.config.max_work_group_size
    }

    /// Kernel launches accepted so far.
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    /// Host-to-device copies performed so far.
    pub fn transfers(&self) -> u64 {
        self.transfers.load(Ordering::Relaxed)
    }

    pub fn alloc_staging<T: Pod>(&self, capacity: usize) -> StagingBuffer<T> {
        StagingBuffer {
            storage: Storage::zeroed(capacity * size_of::<T>()),
            capacity,
            _marker: PhantomData,
        }
    }

    /// Copies host records into a staging buffer; completes before the next submission.
    pub fn stage<T: Pod>(&self, buffer: &StagingBuffer<T>, items: &[T]) -> BackendResult<()> {
        if items.len() > buffer.capacity {
            return Err(LaunchError::StagingOverrun {
                items: items.len(),
                capacity: buffer.capacity,
            }
            .into());
        }
        let _queue = self.lock_queue()?;
        let bytes: &[u8] = bytemuck::cast_slice(items);
        // SAFETY: length checked against the capacity; the queue lock excludes kernels that
        // could be reading the buffer.
        unsafe { buffer.storage.write_bytes(0, bytes) };
        self.transfers.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "xpu staging copy: {} bytes to {:#x}",
            bytes.len(),
            buffer.device_ptr()
        );
        Ok(())
    }

    /// Reads the first `len` records of a staging buffer back to the host.
    pub fn read_back<T: Pod>(&self, buffer: &StagingBuffer<T>, len: usize) -> BackendResult<Vec<T>> {
        let _queue = self.lock_queue()?;
        Ok(buffer.device_slice(len)?.to_vec())
    }

    /// Runs `kernel` once per work-item of `range` and returns when every item has finished.
    pub fn submit_2d<K>(&self, range: NdRange2, kernel: K) -> BackendResult<()>
    where
        K: Fn(NdItem) + Sync,
    {
        let groups = range.validate(self.config.max_work_group_size)?;
        let _queue = self.lock_queue()?;
        let submission = self.submissions.load(Ordering::Relaxed);
        if let Some(limit) = self.config.fail_after_submissions {
            if submission >= limit {
                return Err(LaunchError::QueueRejected { submission }.into());
            }
        }
        self.submissions.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "xpu submit #{submission}: global {:?} local {:?}",
            range.global,
            range.local
        );

        let total_groups = groups[0] as u64 * groups[1] as u64;
        (0..total_groups).into_par_iter().for_each(|linear| {
            let group = [
                (linear % groups[0] as u64) as u32,
                (linear / groups[0] as u64) as u32,
            ];
            for ly in 0..range.local[1] {
                for lx in 0..range.local[0] {
                    kernel(NdItem {
                        group,
                        local_id: [lx, ly],
                        local_range: range.local,
                        group_range: groups,
                    });
                }
            }
        });
        Ok(())
    }

    fn lock_queue(&self) -> BackendResult<std::sync::MutexGuard<'_, ()>> {
        self.queue
            .lock()
            .map_err(|_| BackendError::execution("xpu device queue mutex poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    fn small_device() -> Arc<Device> {
        Device::new(DeviceConfig {
            compute_units: 4,
            max_work_group_size: 8,
            fail_after_submissions: None,
        })
    }

    #[test]
    fn every_work_item_runs_exactly_once() {
        let device = small_device();
        let hits: Vec<AtomicU32> = (0..16 * 3).map(|_| AtomicU32::new(0)).collect();
        device
            .submit_2d(NdRange2::new([16, 3], [8, 1]), |item| {
                let idx = item.get_global_id(1) * 16 + item.get_global_id(0);
                hits[idx as usize].fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
        assert_eq!(device.submissions(), 1);
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        let device = small_device();
        let noop = |_: NdItem| {};
        let err = device
            .submit_2d(NdRange2::new([16, 1], [0, 1]), noop)
            .unwrap_err();
        assert!(err.to_string().contains("zero extent"));
        assert!(device
            .submit_2d(NdRange2::new([12, 1], [8, 1]), noop)
            .is_err());
        assert!(device
            .submit_2d(NdRange2::new([32, 1], [16, 1]), noop)
            .is_err());
        assert_eq!(device.submissions(), 0);
    }

    #[test]
    fn staging_roundtrips_records() {
        let device = small_device();
        let buffer = device.alloc_staging::<u64>(4);
        device.stage(&buffer, &[7, 8, 9]).unwrap();
        assert_eq!(device.read_back(&buffer, 3).unwrap(), vec![7, 8, 9]);
        assert!(device.stage(&buffer, &[0; 5]).is_err());
        assert!(buffer.device_slice(5).is_err());
        assert_eq!(device.transfers(), 1);
    }

    #[test]
    fn queue_rejects_after_budget() {
        let device = Device::new(DeviceConfig {
            fail_after_submissions: Some(1),
            ..DeviceConfig::default()
        });
        let range = NdRange2::new([256, 1], [256, 1]);
        device.submit_2d(range, |_| {}).unwrap();
        let err = device.submit_2d(range, |_| {}).unwrap_err();
        assert!(matches!(err, BackendError::Execution { .. }));
    }
}
