/// Surface size in physical pixels.
///
/// Flows into the resolution uniforms of both renderers. Changes only when the
/// displayed surface is resized, and is re-read once per frame.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Resolution uniform value. Zero extents are raised to one so shaders
    /// never divide by zero.
    #[inline]
    pub fn resolution(self) -> [f32; 2] {
        [self.width.max(1) as f32, self.height.max(1) as f32]
    }
}

impl From<winit::dpi::PhysicalSize<u32>> for Viewport {
    fn from(size: winit::dpi::PhysicalSize<u32>) -> Self {
        Viewport::new(size.width, size.height)
    }
}
