//! Device capability table and descriptor validation.

use super::{
    BufferDescriptor, BufferUsage, TextureDescriptor, TextureDimension, TextureFormat,
    TextureUsage,
};

/// Limits and feature support reported by a device.
///
/// Resource descriptors are validated against this table when a virtual
/// resource is created, so invalid requests fail during graph build rather
/// than at allocation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Largest width/height of 1D, 2D and cube textures.
    pub max_texture_dimension_2d: u32,
    /// Largest dimension of volume textures.
    pub max_texture_dimension_3d: u32,
    /// Largest array layer count.
    pub max_texture_array_layers: u32,
    /// Largest supported MSAA sample count.
    pub max_sample_count: u32,
    /// Largest buffer size in bytes.
    pub max_buffer_size: u64,
    /// Whether raytracing acceleration structures are supported.
    pub supports_raytracing: bool,
    /// Formats the device cannot create at all.
    pub unsupported_formats: Vec<TextureFormat>,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_texture_dimension_2d: 16384,
            max_texture_dimension_3d: 2048,
            max_texture_array_layers: 2048,
            max_sample_count: 8,
            max_buffer_size: 1 << 31,
            supports_raytracing: true,
            unsupported_formats: Vec::new(),
        }
    }
}

impl DeviceCapabilities {
    /// Returns true if `format` can be created with every flag in `usage`.
    pub fn supports_format(&self, format: TextureFormat, usage: TextureUsage) -> bool {
        !self.unsupported_formats.contains(&format) && format.supported_usages().contains(usage)
    }

    /// Check a texture descriptor, returning a reason on failure.
    pub fn validate_texture(&self, desc: &TextureDescriptor) -> Result<(), String> {
        if desc.format == TextureFormat::Unknown {
            return Err("format is unknown".to_string());
        }
        if desc.size.is_empty() {
            return Err(format!(
                "dimensions must be positive, got {}x{}x{}",
                desc.size.width, desc.size.height, desc.size.depth
            ));
        }
        if desc.usage.is_empty() {
            return Err("usage flags are empty".to_string());
        }

        match desc.dimension {
            TextureDimension::D2 | TextureDimension::Cube => {
                if desc.size.width.max(desc.size.height) > self.max_texture_dimension_2d {
                    return Err(format!(
                        "size {}x{} exceeds the device limit {}",
                        desc.size.width, desc.size.height, self.max_texture_dimension_2d
                    ));
                }
                if desc.size.depth > self.max_texture_array_layers {
                    return Err(format!(
                        "{} array layers exceed the device limit {}",
                        desc.size.depth, self.max_texture_array_layers
                    ));
                }
                if desc.dimension == TextureDimension::Cube
                    && (desc.size.width != desc.size.height || desc.size.depth % 6 != 0)
                {
                    return Err("cube maps need square faces and a multiple of 6 layers".into());
                }
            }
            TextureDimension::D3 => {
                if desc.size.max_dimension() > self.max_texture_dimension_3d {
                    return Err(format!(
                        "volume size exceeds the device limit {}",
                        self.max_texture_dimension_3d
                    ));
                }
            }
        }

        if desc.mip_level_count == 0 || desc.mip_level_count > desc.max_mip_levels() {
            return Err(format!(
                "mip count {} is outside 1..={}",
                desc.mip_level_count,
                desc.max_mip_levels()
            ));
        }

        if desc.sample_count == 0
            || !desc.sample_count.is_power_of_two()
            || desc.sample_count > self.max_sample_count
        {
            return Err(format!("sample count {} is not supported", desc.sample_count));
        }
        if desc.sample_count > 1 {
            if desc.mip_level_count != 1 {
                return Err("multisampled textures cannot have mips".to_string());
            }
            if desc.dimension != TextureDimension::D2 {
                return Err("only 2D textures can be multisampled".to_string());
            }
            if desc.usage.contains(TextureUsage::UNORDERED_ACCESS) {
                return Err("multisampled textures cannot be unordered access".to_string());
            }
        }

        if desc
            .usage
            .contains(TextureUsage::RENDER_TARGET | TextureUsage::DEPTH_STENCIL)
        {
            return Err("render target and depth-stencil usage are mutually exclusive".into());
        }
        if desc.usage.contains(TextureUsage::DEPTH_STENCIL) && desc.dimension == TextureDimension::D3
        {
            return Err("volume textures cannot be depth-stencil targets".to_string());
        }
        if !self.supports_format(desc.format, desc.usage) {
            return Err(format!(
                "format {:?} does not support usage {:?}",
                desc.format, desc.usage
            ));
        }
        Ok(())
    }

    /// Check a buffer descriptor, returning a reason on failure.
    pub fn validate_buffer(&self, desc: &BufferDescriptor) -> Result<(), String> {
        if desc.size == 0 {
            return Err("size must be positive".to_string());
        }
        if desc.size > self.max_buffer_size {
            return Err(format!(
                "size {} exceeds the device limit {}",
                desc.size, self.max_buffer_size
            ));
        }
        if desc.element_size == 0 || desc.element_count == 0 {
            return Err("element size and count must be positive".to_string());
        }
        if desc.usage.contains(BufferUsage::STRUCTURED)
            && desc.size != desc.element_size as u64 * desc.element_count as u64
        {
            return Err(format!(
                "structured size {} does not match {} x {}",
                desc.size, desc.element_count, desc.element_size
            ));
        }
        if desc.usage.contains(BufferUsage::BYTE_ADDRESS) && desc.size % 4 != 0 {
            return Err("byte-address buffers must be a multiple of 4 bytes".to_string());
        }
        if desc
            .usage
            .contains(BufferUsage::STRUCTURED | BufferUsage::BYTE_ADDRESS)
        {
            return Err("a buffer cannot be both structured and byte-address".to_string());
        }
        if let Some(format) = desc.format {
            if format == TextureFormat::Unknown || format.is_depth_stencil() {
                return Err(format!("{format:?} is not a valid typed buffer format"));
            }
            if self.unsupported_formats.contains(&format) {
                return Err(format!("format {format:?} is not supported"));
            }
        }
        if desc.usage.contains(BufferUsage::UPLOAD | BufferUsage::READBACK) {
            return Err("upload and readback heaps are mutually exclusive".to_string());
        }
        if desc.is_cpu_visible()
            && desc
                .usage
                .intersects(BufferUsage::UNORDERED_ACCESS | BufferUsage::ACCELERATION_STRUCTURE)
        {
            return Err("CPU visible buffers cannot be written by the GPU".to_string());
        }
        if desc.usage.contains(BufferUsage::ACCELERATION_STRUCTURE) && !self.supports_raytracing {
            return Err("acceleration structures require raytracing support".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> DeviceCapabilities {
        DeviceCapabilities::default()
    }

    #[test]
    fn test_valid_render_target() {
        let desc = TextureDescriptor::new_2d(
            1920,
            1080,
            TextureFormat::Rgba16Float,
            TextureUsage::RENDER_TARGET | TextureUsage::SHADER_RESOURCE,
        );
        assert!(caps().validate_texture(&desc).is_ok());
    }

    #[test]
    fn test_zero_size_rejected() {
        let desc =
            TextureDescriptor::new_2d(0, 16, TextureFormat::Rgba8Unorm, TextureUsage::SHADER_RESOURCE);
        assert!(caps().validate_texture(&desc).is_err());
    }

    #[test]
    fn test_depth_uav_rejected() {
        let desc = TextureDescriptor::new_2d(
            64,
            64,
            TextureFormat::Depth32Float,
            TextureUsage::DEPTH_STENCIL | TextureUsage::UNORDERED_ACCESS,
        );
        let err = caps().validate_texture(&desc).unwrap_err();
        assert!(err.contains("does not support"));
    }

    #[test]
    fn test_msaa_rules() {
        let base = TextureDescriptor::new_2d(
            64,
            64,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_TARGET,
        );
        assert!(caps().validate_texture(&base.with_sample_count(4)).is_ok());
        assert!(caps().validate_texture(&base.with_sample_count(3)).is_err());
        assert!(caps().validate_texture(&base.with_sample_count(16)).is_err());
        assert!(caps()
            .validate_texture(&base.with_sample_count(4).with_mip_levels(2))
            .is_err());
    }

    #[test]
    fn test_too_many_mips() {
        let desc =
            TextureDescriptor::new_2d(16, 16, TextureFormat::R8Unorm, TextureUsage::SHADER_RESOURCE)
                .with_mip_levels(6);
        assert!(caps().validate_texture(&desc).is_err());
    }

    #[test]
    fn test_unsupported_format() {
        let caps = DeviceCapabilities {
            unsupported_formats: vec![TextureFormat::Rg11b10Float],
            ..Default::default()
        };
        let desc = TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::Rg11b10Float,
            TextureUsage::SHADER_RESOURCE,
        );
        assert!(caps.validate_texture(&desc).is_err());
    }

    #[test]
    fn test_buffer_rules() {
        assert!(caps().validate_buffer(&BufferDescriptor::structured(16, 64)).is_ok());
        assert!(caps().validate_buffer(&BufferDescriptor::byte_address(6)).is_err());
        assert!(caps()
            .validate_buffer(
                &BufferDescriptor::new(64, BufferUsage::UPLOAD | BufferUsage::UNORDERED_ACCESS)
            )
            .is_err());
        assert!(caps()
            .validate_buffer(&BufferDescriptor::new(64, BufferUsage::UPLOAD | BufferUsage::READBACK))
            .is_err());
        assert!(caps().validate_buffer(&BufferDescriptor::new(0, BufferUsage::empty())).is_err());
    }

    #[test]
    fn test_acceleration_structure_needs_raytracing() {
        let caps = DeviceCapabilities {
            supports_raytracing: false,
            ..Default::default()
        };
        let desc = BufferDescriptor::new(1024, BufferUsage::ACCELERATION_STRUCTURE);
        assert!(caps.validate_buffer(&desc).is_err());
    }
}
