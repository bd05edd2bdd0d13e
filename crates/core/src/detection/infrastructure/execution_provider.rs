use ort::execution_providers::ExecutionProviderDispatch;

/// Hardware-accelerated providers to try before the CPU default.
///
/// ONNX Runtime falls back to CPU on its own when a listed provider fails to
/// register, so an empty list simply means CPU-only.
pub fn accelerated_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}
