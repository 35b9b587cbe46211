//! Buffer types and descriptors.

use bitflags::bitflags;

use super::TextureFormat;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// CPU-writable upload heap memory.
        const UPLOAD = 1 << 0;
        /// CPU-readable readback heap memory.
        const READBACK = 1 << 1;
        /// Raw buffer addressed in bytes.
        const BYTE_ADDRESS = 1 << 2;
        /// Structured buffer with a fixed element stride.
        const STRUCTURED = 1 << 3;
        /// Buffer can be bound as an unordered access view.
        const UNORDERED_ACCESS = 1 << 4;
        /// Buffer can hold indirect draw/dispatch arguments.
        const INDIRECT_ARGUMENTS = 1 << 5;
        /// Raytracing acceleration structure storage.
        const ACCELERATION_STRUCTURE = 1 << 6;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for a buffer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    /// Size in bytes.
    pub size: u64,
    /// Stride of one element in bytes.
    pub element_size: u32,
    /// Number of elements.
    pub element_count: u32,
    /// Element format for typed buffers.
    pub format: Option<TextureFormat>,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create an untyped buffer descriptor of `size` bytes.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            size,
            element_size: 1,
            element_count: size.min(u32::MAX as u64) as u32,
            format: None,
            usage,
        }
    }

    /// Structured buffer of `element_count` elements of `element_size` bytes.
    pub fn structured(element_size: u32, element_count: u32) -> Self {
        Self {
            size: element_size as u64 * element_count as u64,
            element_size,
            element_count,
            format: None,
            usage: BufferUsage::STRUCTURED,
        }
    }

    /// Raw byte-address buffer of `size` bytes.
    pub fn byte_address(size: u64) -> Self {
        Self {
            size,
            element_size: 4,
            element_count: (size / 4).min(u32::MAX as u64) as u32,
            format: None,
            usage: BufferUsage::BYTE_ADDRESS,
        }
    }

    /// Typed buffer of `element_count` texels of `format`.
    pub fn typed(format: TextureFormat, element_count: u32) -> Self {
        let element_size = format.block_size();
        Self {
            size: element_size as u64 * element_count as u64,
            element_size,
            element_count,
            format: Some(format),
            usage: BufferUsage::empty(),
        }
    }

    /// Buffer holding `count` indirect argument records of `stride` bytes.
    pub fn indirect_arguments(stride: u32, count: u32) -> Self {
        Self {
            usage: BufferUsage::INDIRECT_ARGUMENTS,
            ..Self::structured(stride, count)
        }
    }

    /// Add usage flags.
    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage |= usage;
        self
    }

    /// Returns true if the buffer lives in a CPU visible heap.
    pub fn is_cpu_visible(&self) -> bool {
        self.usage
            .intersects(BufferUsage::UPLOAD | BufferUsage::READBACK)
    }

    /// Returns true if a shader resource view can be created for this buffer.
    pub fn supports_shader_resource(&self) -> bool {
        !self.usage.contains(BufferUsage::READBACK)
            && (self
                .usage
                .intersects(BufferUsage::STRUCTURED | BufferUsage::BYTE_ADDRESS)
                || self.format.is_some())
    }
}

impl Default for BufferDescriptor {
    fn default() -> Self {
        Self::new(256, BufferUsage::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_size() {
        let desc = BufferDescriptor::structured(16, 1024);
        assert_eq!(desc.size, 16 * 1024);
        assert!(desc.supports_shader_resource());
        assert!(!desc.is_cpu_visible());
    }

    #[test]
    fn test_typed_buffer() {
        let desc = BufferDescriptor::typed(TextureFormat::R32Uint, 64)
            .with_usage(BufferUsage::UNORDERED_ACCESS);
        assert_eq!(desc.size, 256);
        assert_eq!(desc.format, Some(TextureFormat::R32Uint));
        assert!(desc.usage.contains(BufferUsage::UNORDERED_ACCESS));
    }

    #[test]
    fn test_readback_has_no_srv() {
        let desc = BufferDescriptor::byte_address(64).with_usage(BufferUsage::READBACK);
        assert!(desc.is_cpu_visible());
        assert!(!desc.supports_shader_resource());
    }

    #[test]
    fn test_indirect_arguments() {
        let desc = BufferDescriptor::indirect_arguments(12, 4);
        assert!(desc.usage.contains(BufferUsage::INDIRECT_ARGUMENTS));
        assert_eq!(desc.size, 48);
    }
}
