// src/error.rs

use std::fmt;

/// Failures of the GPU side of the renderer
#[derive(Debug)]
pub enum RenderError {
    /// No adapter can drive the window surface
    NoAdapter,
    Surface(wgpu::CreateSurfaceError),
    Device(wgpu::RequestDeviceError),
    /// The frame could not be acquired or presented
    Present(wgpu::SurfaceError),
    /// The composited frame could not be mapped back to the host
    Readback(wgpu::BufferAsyncError),
    /// A configured size exceeds what the device supports
    Limit {
        name: &'static str,
        requested: u64,
        max: u64,
    },
}

impl RenderError {
    /// Whether the render loop has to stop
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RenderError::Present(wgpu::SurfaceError::Timeout)
                | RenderError::Present(wgpu::SurfaceError::Lost)
                | RenderError::Present(wgpu::SurfaceError::Outdated)
        )
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NoAdapter => write!(f, "no suitable GPU adapter found"),
            RenderError::Surface(e) => write!(f, "failed to create window surface: {}", e),
            RenderError::Device(e) => write!(f, "failed to open GPU device: {}", e),
            RenderError::Present(e) => write!(f, "failed to present frame: {}", e),
            RenderError::Readback(e) => write!(f, "failed to read back frame: {}", e),
            RenderError::Limit {
                name,
                requested,
                max,
            } => write!(f, "{} needs {} but the GPU allows at most {}", name, requested, max),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<wgpu::CreateSurfaceError> for RenderError {
    fn from(value: wgpu::CreateSurfaceError) -> Self {
        RenderError::Surface(value)
    }
}

impl From<wgpu::RequestDeviceError> for RenderError {
    fn from(value: wgpu::RequestDeviceError) -> Self {
        RenderError::Device(value)
    }
}

impl From<wgpu::SurfaceError> for RenderError {
    fn from(value: wgpu::SurfaceError) -> Self {
        RenderError::Present(value)
    }
}

impl From<wgpu::BufferAsyncError> for RenderError {
    fn from(value: wgpu::BufferAsyncError) -> Self {
        RenderError::Readback(value)
    }
}
