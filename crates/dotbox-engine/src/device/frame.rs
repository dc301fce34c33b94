/// An acquired swapchain image.
///
/// Held from the first clear or draw of a frame until [`Gpu::present`](super::Gpu::present).
/// Every clear and draw records into its own encoder against `view`, so the
/// frame itself carries no encoder.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}
