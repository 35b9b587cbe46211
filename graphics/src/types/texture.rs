//! Texture types and descriptors.

use super::Extent3d;
use bitflags::bitflags;

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    /// Placeholder for a missing format. Never valid for a resource.
    Unknown,

    // 8-bit formats
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 8-bit red channel, unsigned integer.
    R8Uint,

    // 16-bit formats
    /// 16-bit red channel, float.
    R16Float,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,

    // 32-bit formats
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 16-bit RG channels, float.
    Rg16Float,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,
    /// Packed 10-bit RGB with 2-bit alpha.
    Rgb10a2Unorm,
    /// Packed 11/11/10-bit float RGB.
    Rg11b10Float,

    // 64-bit formats
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RG channels, float.
    Rg32Float,

    // 128-bit formats
    /// 32-bit RGBA channels, float.
    Rgba32Float,

    // Depth/stencil formats
    /// 16-bit depth.
    Depth16Unorm,
    /// 24-bit depth with 8-bit stencil.
    Depth24UnormStencil8,
    /// 32-bit depth, float.
    Depth32Float,
    /// 32-bit depth float with 8-bit stencil.
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm
                | Self::Depth24UnormStencil8
                | Self::Depth32Float
                | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24UnormStencil8 | Self::Depth32FloatStencil8)
    }

    /// Returns true for sRGB encoded color formats.
    pub fn is_srgb(&self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb)
    }

    /// Returns the size in bytes per pixel, or 0 for [`TextureFormat::Unknown`].
    pub fn block_size(&self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::R8Unorm | Self::R8Uint => 1,
            Self::R16Float | Self::Rg8Unorm | Self::Depth16Unorm => 2,
            Self::R32Float
            | Self::R32Uint
            | Self::Rg16Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Rgb10a2Unorm
            | Self::Rg11b10Float
            | Self::Depth24UnormStencil8
            | Self::Depth32Float => 4,
            Self::Rgba16Float | Self::Rg32Float | Self::Depth32FloatStencil8 => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Usages a format can be created with on any device.
    ///
    /// Depth formats are attachment and sample only; sRGB and BGRA formats
    /// cannot be bound as unordered access views.
    pub fn supported_usages(&self) -> TextureUsage {
        if *self == Self::Unknown {
            TextureUsage::empty()
        } else if self.is_depth_stencil() {
            TextureUsage::DEPTH_STENCIL | TextureUsage::SHADER_RESOURCE
        } else if self.is_srgb() || matches!(self, Self::Bgra8Unorm) {
            TextureUsage::RENDER_TARGET | TextureUsage::SHADER_RESOURCE
        } else {
            TextureUsage::RENDER_TARGET
                | TextureUsage::SHADER_RESOURCE
                | TextureUsage::UNORDERED_ACCESS
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be bound as a color render target.
        const RENDER_TARGET = 1 << 0;
        /// Texture can be bound as a depth-stencil target.
        const DEPTH_STENCIL = 1 << 1;
        /// Texture can be bound as an unordered access view.
        const UNORDERED_ACCESS = 1 << 2;
        /// Texture can be sampled or read through a shader resource view.
        const SHADER_RESOURCE = 1 << 3;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::SHADER_RESOURCE
    }
}

/// Dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    /// 2D texture, `size.depth` is the array layer count.
    #[default]
    D2,
    /// Volume texture, `size.depth` is the depth in texels.
    D3,
    /// Cube map, `size.depth` is the layer count (multiple of 6).
    Cube,
}

/// Descriptor for a texture resource.
///
/// Every field participates in pooling: two textures can share a physical
/// allocation only if their descriptors compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Texture dimensionality.
    pub dimension: TextureDimension,
    /// Size of the texture.
    pub size: Extent3d,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Sample count for multisampling.
    pub sample_count: u32,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            dimension: TextureDimension::D2,
            size: Extent3d::new_2d(width, height),
            mip_level_count: 1,
            sample_count: 1,
            format,
            usage,
        }
    }

    /// Create a new 3D texture descriptor.
    pub fn new_3d(
        width: u32,
        height: u32,
        depth: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            dimension: TextureDimension::D3,
            size: Extent3d::new_3d(width, height, depth),
            ..Self::new_2d(width, height, format, usage)
        }
    }

    /// Create a cube map descriptor with six faces.
    pub fn new_cube(size: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            dimension: TextureDimension::Cube,
            size: Extent3d::new_3d(size, size, 6),
            ..Self::new_2d(size, size, format, usage)
        }
    }

    /// Set the array layer count of a 2D texture.
    pub fn with_array_layers(mut self, layers: u32) -> Self {
        self.size.depth = layers;
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Use a full mip chain down to 1x1.
    pub fn with_full_mip_chain(mut self) -> Self {
        self.mip_level_count = self.max_mip_levels();
        self
    }

    /// Set the sample count for multisampling.
    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Number of mips a full chain has for this size.
    pub fn max_mip_levels(&self) -> u32 {
        let largest = match self.dimension {
            TextureDimension::D3 => self.size.max_dimension(),
            _ => self.size.width.max(self.size.height),
        };
        32 - largest.max(1).leading_zeros()
    }

    /// Number of array layers (1 for volume textures).
    pub fn array_layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D3 => 1,
            _ => self.size.depth,
        }
    }

    /// Approximate memory footprint in bytes, used for diagnostics.
    pub fn approximate_size(&self) -> u64 {
        let mut total = 0u64;
        let (mut w, mut h, mut d) = (self.size.width, self.size.height, self.size.depth);
        for _ in 0..self.mip_level_count {
            total += w as u64 * h as u64 * d as u64 * self.format.block_size() as u64;
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            if self.dimension == TextureDimension::D3 {
                d = (d / 2).max(1);
            }
        }
        total * self.sample_count as u64
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self::new_2d(1, 1, TextureFormat::default(), TextureUsage::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_format_queries() {
        assert!(TextureFormat::Depth32Float.is_depth_stencil());
        assert!(!TextureFormat::Depth32Float.has_stencil());
        assert!(TextureFormat::Depth24UnormStencil8.has_stencil());
        assert!(!TextureFormat::Rgba16Float.is_depth_stencil());
    }

    #[test]
    fn test_supported_usages() {
        let depth = TextureFormat::Depth32Float.supported_usages();
        assert!(depth.contains(TextureUsage::DEPTH_STENCIL));
        assert!(!depth.contains(TextureUsage::UNORDERED_ACCESS));

        let srgb = TextureFormat::Rgba8UnormSrgb.supported_usages();
        assert!(!srgb.contains(TextureUsage::UNORDERED_ACCESS));

        assert!(TextureFormat::Unknown.supported_usages().is_empty());
    }

    #[test]
    fn test_mip_chain() {
        let desc = TextureDescriptor::new_2d(
            1920,
            1080,
            TextureFormat::Rgba16Float,
            TextureUsage::SHADER_RESOURCE,
        )
        .with_full_mip_chain();
        assert_eq!(desc.mip_level_count, 11);

        let volume = TextureDescriptor::new_3d(
            8,
            8,
            64,
            TextureFormat::R16Float,
            TextureUsage::UNORDERED_ACCESS,
        );
        assert_eq!(volume.max_mip_levels(), 7);
        assert_eq!(volume.array_layers(), 1);
    }

    #[test]
    fn test_cube_layers() {
        let cube = TextureDescriptor::new_cube(
            256,
            TextureFormat::Rgba16Float,
            TextureUsage::SHADER_RESOURCE,
        );
        assert_eq!(cube.array_layers(), 6);
    }

    #[test]
    fn test_approximate_size() {
        let desc = TextureDescriptor::new_2d(
            256,
            256,
            TextureFormat::Rgba8Unorm,
            TextureUsage::SHADER_RESOURCE,
        );
        assert_eq!(desc.approximate_size(), 256 * 256 * 4);
    }
}
