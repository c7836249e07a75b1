//! Accelerator backend for xpu-rs.
//!
//! Kernels run on a work-queue [`device::Device`]; concatenation picks between a batched,
//! descriptor-driven copy kernel and a per-input strided copy (see [`cat`]).

pub mod cat;
pub mod device;
mod env;

use std::sync::Arc;

use xpu_rs::backend::spec::{BackendResult, TensorBackend};
use xpu_rs::tensor::Tensor;

pub use cat::{CatConfig, CatPlan, CatStrategy};
pub use device::{Device, DeviceConfig};

#[derive(Debug, Clone)]
pub struct XpuBackend {
    device: Arc<Device>,
    cat_config: CatConfig,
}

impl Default for XpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl XpuBackend {
    /// Backend on the process-wide device, configured from the environment.
    pub fn new() -> Self {
        Self::with_device(device::device(), CatConfig::from_env())
    }

    pub fn with_device(device: Arc<Device>, cat_config: CatConfig) -> Self {
        Self { device, cat_config }
    }

    pub fn is_available() -> bool {
        device::is_available()
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn cat_config(&self) -> &CatConfig {
        &self.cat_config
    }

    /// Like [`TensorBackend::cat_out`], also reporting which strategy ran.
    pub fn cat_out_planned(
        &self,
        out: &mut Tensor,
        inputs: &[Tensor],
        dim: i64,
    ) -> BackendResult<CatPlan> {
        cat::cat_out(&self.device, &self.cat_config, out, inputs, dim)
    }
}

impl TensorBackend for XpuBackend {
    fn backend_name(&self) -> &str {
        "xpu"
    }

    fn cat_out(&self, out: &mut Tensor, inputs: &[Tensor], dim: i64) -> BackendResult<()> {
        self.cat_out_planned(out, inputs, dim).map(|_| ())
    }
}

/// Register the accelerator backend with the global backend registry under `"xpu"`.
///
/// Called automatically from a load-time initializer on ELF targets; calling it again is
/// harmless.
pub fn register_xpu_backend() {
    xpu_rs::backend::registry::register_backend("xpu", XpuBackend::new);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_XPU_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_xpu_backend();
    }
    register
};
