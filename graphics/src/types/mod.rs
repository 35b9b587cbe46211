//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, resource states and the
//! descriptor structs used throughout the render graph.

mod buffer;
mod capabilities;
mod common;
mod state;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use capabilities::DeviceCapabilities;
pub use common::{ClearValue, Extent3d};
pub use state::ResourceState;
pub use texture::{TextureDescriptor, TextureDimension, TextureFormat, TextureUsage};

/// Descriptor of either kind of resource.
///
/// This is the pooling key of the transient allocator: every field that
/// affects allocation is part of the value, names are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceDescriptor {
    /// Texture resource.
    Texture(TextureDescriptor),
    /// Buffer resource.
    Buffer(BufferDescriptor),
}

impl ResourceDescriptor {
    /// Returns true for textures.
    pub fn is_texture(&self) -> bool {
        matches!(self, Self::Texture(_))
    }

    /// Returns true for buffers.
    pub fn is_buffer(&self) -> bool {
        matches!(self, Self::Buffer(_))
    }

    /// Texture descriptor, if this is a texture.
    pub fn as_texture(&self) -> Option<&TextureDescriptor> {
        match self {
            Self::Texture(desc) => Some(desc),
            Self::Buffer(_) => None,
        }
    }

    /// Buffer descriptor, if this is a buffer.
    pub fn as_buffer(&self) -> Option<&BufferDescriptor> {
        match self {
            Self::Buffer(desc) => Some(desc),
            Self::Texture(_) => None,
        }
    }

    /// Stable 64-bit hash of the descriptor, for logs and dumps.
    pub fn hash_key(&self) -> u64 {
        use std::hash::{DefaultHasher, Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns true if the descriptor allows a shader resource view.
    pub fn supports_shader_resource(&self) -> bool {
        match self {
            Self::Texture(desc) => desc.usage.contains(TextureUsage::SHADER_RESOURCE),
            Self::Buffer(desc) => desc.supports_shader_resource(),
        }
    }

    /// Returns true if the descriptor allows an unordered access view.
    pub fn supports_unordered_access(&self) -> bool {
        match self {
            Self::Texture(desc) => desc.usage.contains(TextureUsage::UNORDERED_ACCESS),
            Self::Buffer(desc) => desc.usage.contains(BufferUsage::UNORDERED_ACCESS),
        }
    }

    /// Short human-readable summary used in diagnostics.
    pub fn summary(&self) -> String {
        match self {
            Self::Texture(desc) => format!(
                "{:?} {}x{}x{} mips={} samples={}",
                desc.format,
                desc.size.width,
                desc.size.height,
                desc.size.depth,
                desc.mip_level_count,
                desc.sample_count
            ),
            Self::Buffer(desc) => format!(
                "buffer {} bytes ({} x {})",
                desc.size, desc.element_count, desc.element_size
            ),
        }
    }
}

impl From<TextureDescriptor> for ResourceDescriptor {
    fn from(desc: TextureDescriptor) -> Self {
        Self::Texture(desc)
    }
}

impl From<BufferDescriptor> for ResourceDescriptor {
    fn from(desc: BufferDescriptor) -> Self {
        Self::Buffer(desc)
    }
}
