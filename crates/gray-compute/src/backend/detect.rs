//! Backend probing and auto-selection.

use super::Backend;
use super::memory::{format_bytes, system_memory};

/// Result of probing one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    /// Backend probed.
    pub backend: Backend,
    /// Whether support was compiled in (`wgpu` / `cuda` features).
    pub compiled: bool,
    /// Device the backend would run on, if one was found.
    pub device: Option<String>,
}

impl BackendInfo {
    /// Whether a device was found.
    pub fn available(&self) -> bool {
        self.device.is_some()
    }
}

/// Describe the device `backend` would run on.
///
/// `Auto` is not a device and probes to `None`.
pub(super) fn probe(backend: Backend) -> Option<String> {
    match backend {
        Backend::Auto => None,
        Backend::Cpu => Some(format!(
            "{} threads, {} RAM",
            rayon::current_num_threads(),
            format_bytes(system_memory())
        )),
        #[cfg(feature = "wgpu")]
        Backend::Wgpu => super::WgpuPrimitives::probe(),
        #[cfg(not(feature = "wgpu"))]
        Backend::Wgpu => None,
        #[cfg(feature = "cuda")]
        Backend::Cuda => super::CudaPrimitives::probe(),
        #[cfg(not(feature = "cuda"))]
        Backend::Cuda => None,
    }
}

/// Probe every concrete backend, most preferred first.
pub fn detect_backends() -> Vec<BackendInfo> {
    Backend::PREFERENCE
        .into_iter()
        .map(|backend| BackendInfo {
            backend,
            compiled: backend.is_compiled(),
            device: probe(backend),
        })
        .collect()
}

/// First backend in preference order that has a device.
///
/// Stops probing at the first hit, so a present CUDA device never opens a
/// wgpu instance.
pub fn select_best_backend() -> Backend {
    Backend::PREFERENCE
        .into_iter()
        .find(|b| b.is_available())
        .unwrap_or(Backend::Cpu)
}

/// One line per backend: `[+] name: device` or `[-] name: reason`.
pub fn describe_backends() -> String {
    detect_backends()
        .iter()
        .map(|info| match (&info.device, info.compiled) {
            (Some(device), _) => format!("[+] {}: {device}\n", info.backend.name()),
            (None, true) => format!("[-] {}: no device found\n", info.backend.name()),
            (None, false) => format!("[-] {}: not compiled in\n", info.backend.name()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_always_detected() {
        let backends = detect_backends();
        let cpu = backends.iter().find(|b| b.backend == Backend::Cpu).unwrap();
        assert!(cpu.compiled);
        assert!(cpu.available());
        assert!(cpu.device.as_deref().unwrap().contains("threads"));
    }

    #[test]
    fn test_preference_order() {
        let order: Vec<_> = detect_backends().into_iter().map(|b| b.backend).collect();
        assert_eq!(order, vec![Backend::Cuda, Backend::Wgpu, Backend::Cpu]);
        assert_eq!(probe(Backend::Auto), None);
    }

    #[test]
    fn test_best_is_available() {
        assert!(select_best_backend().is_available());
        assert!(describe_backends().contains("[+] cpu:"));
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_missing_feature_described() {
        assert!(describe_backends().contains("[-] cuda: not compiled in"));
    }
}
