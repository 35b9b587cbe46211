//! GPU resource states tracked by the barrier planner.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Explicit GPU resource state, modeled on D3D12 resource states.
    ///
    /// Read states may be combined. Write states and the acceleration
    /// structure state are exclusive and must appear alone.
    /// [`ResourceState::COMMON`] (alias [`ResourceState::PRESENT`]) is the
    /// empty set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceState: u32 {
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const UNORDERED_ACCESS = 1 << 3;
        const DEPTH_WRITE = 1 << 4;
        const DEPTH_READ = 1 << 5;
        const NON_PIXEL_SHADER_RESOURCE = 1 << 6;
        const PIXEL_SHADER_RESOURCE = 1 << 7;
        const INDIRECT_ARGUMENT = 1 << 8;
        const COPY_DEST = 1 << 9;
        const COPY_SOURCE = 1 << 10;
        const RAYTRACING_ACCELERATION_STRUCTURE = 1 << 11;

        const ALL_SHADER_RESOURCE = Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits();
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits();
    }
}

const STATE_NAMES: [(ResourceState, &str); 12] = [
    (ResourceState::VERTEX_AND_CONSTANT_BUFFER, "VertexAndConstantBuffer"),
    (ResourceState::INDEX_BUFFER, "IndexBuffer"),
    (ResourceState::RENDER_TARGET, "RenderTarget"),
    (ResourceState::UNORDERED_ACCESS, "UnorderedAccess"),
    (ResourceState::DEPTH_WRITE, "DepthWrite"),
    (ResourceState::DEPTH_READ, "DepthRead"),
    (ResourceState::NON_PIXEL_SHADER_RESOURCE, "NonPixelShaderResource"),
    (ResourceState::PIXEL_SHADER_RESOURCE, "PixelShaderResource"),
    (ResourceState::INDIRECT_ARGUMENT, "IndirectArgument"),
    (ResourceState::COPY_DEST, "CopyDest"),
    (ResourceState::COPY_SOURCE, "CopySource"),
    (
        ResourceState::RAYTRACING_ACCELERATION_STRUCTURE,
        "RaytracingAccelerationStructure",
    ),
];

impl ResourceState {
    /// Initial state of freshly created resources and of presentable images.
    pub const COMMON: Self = Self::empty();
    /// Swapchain presentation state.
    pub const PRESENT: Self = Self::COMMON;

    /// States that imply a GPU write.
    pub const WRITE_STATES: Self = Self::RENDER_TARGET
        .union(Self::UNORDERED_ACCESS)
        .union(Self::DEPTH_WRITE)
        .union(Self::COPY_DEST);

    /// States that cannot be combined with any other bit.
    pub const EXCLUSIVE_STATES: Self =
        Self::WRITE_STATES.union(Self::RAYTRACING_ACCELERATION_STRUCTURE);

    /// Returns true if the state contains a writable bit.
    pub fn is_write(self) -> bool {
        self.intersects(Self::WRITE_STATES)
    }

    /// Returns true if the state only contains combinable read bits.
    pub fn is_read_only(self) -> bool {
        !self.intersects(Self::EXCLUSIVE_STATES)
    }

    /// Returns true if the state contains an exclusive bit.
    pub fn is_exclusive(self) -> bool {
        self.intersects(Self::EXCLUSIVE_STATES)
    }

    /// Returns true if this combination of bits is legal for one resource.
    pub fn is_valid_combination(self) -> bool {
        !self.is_exclusive() || self.bits().count_ones() == 1
    }

    /// Returns true if a shader resource view is needed for this state.
    pub fn needs_shader_resource_view(self) -> bool {
        self.intersects(Self::ALL_SHADER_RESOURCE | Self::DEPTH_READ)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Common");
        }
        let mut first = true;
        for (flag, name) in STATE_NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

static_assertions::const_assert_eq!(std::mem::size_of::<ResourceState>(), 4);
