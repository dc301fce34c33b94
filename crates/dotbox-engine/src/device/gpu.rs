use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::coords::Viewport;

use super::surface;
use super::{GpuFrame, GpuInit, SurfaceErrorAction};

/// Owns the wgpu device, queue and the window surface.
///
/// - creates Instance/Adapter/Device/Queue
/// - configures the Surface at an explicit pixel size
/// - acquires frames, submits encoders and presents
pub struct Gpu<'w> {
    /// Window the surface is bound to. Its inner size is the displayed size.
    window: &'w Window,

    surface: wgpu::Surface<'w>,

    device: wgpu::Device,

    queue: wgpu::Queue,

    /// Active surface configuration.
    config: wgpu::SurfaceConfiguration,

    /// Backing surface size in physical pixels.
    size: Viewport,
}

impl<'w> Gpu<'w> {
    /// Creates a GPU context bound to `window` with a `size` backing surface.
    ///
    /// `label` names the device and shows up in wgpu validation messages.
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(
        window: &'w Window,
        label: &str,
        size: Viewport,
        init: GpuInit,
    ) -> Result<Self> {
        anyhow::ensure!(size.is_valid(), "surface `{label}` has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let adapter_info = adapter.get_info();
        let required_limits = init.device_limits(adapter.limits());
        log::info!(
            "surface `{label}`: using {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: wgpu::Features::empty(),
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&caps.formats)
            .context("no supported surface formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode: surface::choose_alpha_mode(&caps.alpha_modes, init.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);

        // The backing size is authoritative; ask the window to match it.
        let _ = window.request_inner_size(PhysicalSize::new(size.width, size.height));

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Backing surface size.
    pub fn size(&self) -> Viewport {
        self.size
    }

    /// Size the window is currently displayed at.
    pub fn display_size(&self) -> Viewport {
        self.window.inner_size().into()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Reconfigures the surface.
    ///
    /// wgpu cannot configure a 0x0 surface; the size is recorded and
    /// configuration is deferred until a non-zero size arrives.
    pub fn resize(&mut self, new_size: Viewport) {
        self.size = new_size;
        if !new_size.is_valid() {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
    }

    /// Acquires the next swapchain image.
    pub fn begin_frame(&self) -> std::result::Result<GpuFrame, wgpu::SurfaceError> {
        let surface_texture = self.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuFrame {
            surface_texture,
            view,
        })
    }

    /// Allocates a buffer, reporting allocation failure instead of handing it
    /// to the device's uncaptured-error handler.
    pub fn try_create_buffer(
        &self,
        desc: &wgpu::BufferDescriptor<'_>,
    ) -> std::result::Result<wgpu::Buffer, wgpu::Error> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(desc);
        match pollster::block_on(scope.pop()) {
            Some(err) => Err(err),
            None => Ok(buffer),
        }
    }

    pub fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Submits one encoder. Buffer writes queued before this call land first.
    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Presents an acquired frame.
    pub fn present(&self, frame: GpuFrame) {
        self.window.pre_present_notify();
        drop(frame.view);
        frame.surface_texture.present();
    }

    /// Converts a `SurfaceError` into a higher-level action, reconfiguring the
    /// surface when it was lost or outdated.
    pub fn handle_surface_error(&mut self, err: &wgpu::SurfaceError) -> SurfaceErrorAction {
        let action = surface::classify_surface_error(err);
        if action == SurfaceErrorAction::Reconfigured && self.size.is_valid() {
            self.surface.configure(&self.device, &self.config);
        }
        action
    }
}
