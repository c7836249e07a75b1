pub mod cpu;

pub use cpu::CpuBackend;

/// Registers the reference backend as `"cpu"`; also run from the load-time initializer below.
pub fn register_cpu_backend() {
    xpu_rs::backend::registry::register_backend("cpu", CpuBackend::new);
}

// Auto-register on library load
#[cfg(any(target_os = "linux", target_os = "android"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_CPU_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_cpu_backend();
    }
    register
};
