//! Common types shared across the graphics system.

/// 3D extent for textures.
///
/// For array and cube textures `depth` holds the array layer count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels or array layer count.
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 2D extent.
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    /// Create a new 3D extent.
    pub fn new_3d(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Largest of the three dimensions.
    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height).max(self.depth)
    }

    /// Returns true if any dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }
}

/// Clear value for render target and depth-stencil attachments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// Clear color attachment with RGBA values.
    Color { r: f32, g: f32, b: f32, a: f32 },
    /// Clear depth plane.
    Depth(f32),
    /// Clear stencil plane.
    Stencil(u32),
    /// Clear depth and stencil planes.
    DepthStencil { depth: f32, stencil: u32 },
}

impl ClearValue {
    /// Create a color clear value.
    pub fn color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Color { r, g, b, a }
    }

    /// Create a depth clear value.
    pub fn depth(value: f32) -> Self {
        Self::Depth(value)
    }

    /// Transparent black.
    pub fn transparent() -> Self {
        Self::color(0.0, 0.0, 0.0, 0.0)
    }
}

impl Default for ClearValue {
    fn default() -> Self {
        Self::transparent()
    }
}
