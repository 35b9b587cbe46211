//! Render target bindings for raster passes.

use crate::types::ClearValue;

use super::TextureHandle;

/// Maximum number of simultaneously bound color targets.
pub const MAX_RENDER_TARGETS: usize = 8;

/// Operation to perform when loading an attachment at the start of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LoadOp {
    /// Load the existing contents of the attachment.
    #[default]
    Load,
    /// Clear the attachment with a specified value.
    Clear(ClearValue),
    /// Don't care about the existing contents (may be undefined).
    DontCare,
    /// The plane is not accessed by the pass.
    NoAccess,
}

impl LoadOp {
    /// Create a clear operation with a color value.
    pub fn clear_color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Clear(ClearValue::color(r, g, b, a))
    }

    /// Create a clear operation with a depth value.
    pub fn clear_depth(depth: f32) -> Self {
        Self::Clear(ClearValue::depth(depth))
    }

    /// Returns true if the previous contents are read.
    pub fn reads_contents(&self) -> bool {
        matches!(self, Self::Load)
    }
}

/// Operation to perform when storing an attachment at the end of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    /// Store the attachment contents for later use.
    #[default]
    Store,
    /// Resolve the multisampled contents.
    Resolve,
    /// Don't care about the contents after the pass (may be discarded).
    DontCare,
}

/// A color render target bound to a raster pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTargetBinding {
    /// Target texture.
    pub texture: TextureHandle,
    /// Load operation.
    pub load_op: LoadOp,
    /// Store operation.
    pub store_op: StoreOp,
    /// Mip level rendered to.
    pub mip_level: u32,
    /// Array slice rendered to.
    pub array_slice: u32,
}

impl RenderTargetBinding {
    /// Bind mip 0 / slice 0 of `texture`, storing the result.
    pub fn new(texture: TextureHandle, load_op: LoadOp) -> Self {
        Self {
            texture,
            load_op,
            store_op: StoreOp::Store,
            mip_level: 0,
            array_slice: 0,
        }
    }

    /// Set the store operation.
    pub fn with_store_op(mut self, store_op: StoreOp) -> Self {
        self.store_op = store_op;
        self
    }

    /// Render into a specific mip and array slice.
    pub fn with_subresource(mut self, mip_level: u32, array_slice: u32) -> Self {
        self.mip_level = mip_level;
        self.array_slice = array_slice;
        self
    }
}

/// A depth-stencil target bound to a raster pass.
///
/// Depth and stencil planes carry independent load and store operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilBinding {
    /// Depth texture.
    pub texture: TextureHandle,
    /// Depth plane load operation.
    pub depth_load_op: LoadOp,
    /// Depth plane store operation.
    pub depth_store_op: StoreOp,
    /// Stencil plane load operation.
    pub stencil_load_op: LoadOp,
    /// Stencil plane store operation.
    pub stencil_store_op: StoreOp,
    /// Bind both planes read-only.
    pub read_only: bool,
}

impl DepthStencilBinding {
    /// Writable depth binding; the stencil plane is not accessed.
    pub fn new(texture: TextureHandle, depth_load_op: LoadOp, depth_store_op: StoreOp) -> Self {
        Self {
            texture,
            depth_load_op,
            depth_store_op,
            stencil_load_op: LoadOp::NoAccess,
            stencil_store_op: StoreOp::DontCare,
            read_only: false,
        }
    }

    /// Read-only depth binding (depth test without depth writes).
    pub fn read_only(texture: TextureHandle) -> Self {
        Self {
            read_only: true,
            ..Self::new(texture, LoadOp::Load, StoreOp::Store)
        }
    }

    /// Set stencil plane operations.
    pub fn with_stencil(mut self, load_op: LoadOp, store_op: StoreOp) -> Self {
        self.stencil_load_op = load_op;
        self.stencil_store_op = store_op;
        self
    }

    /// Returns true if either plane's previous contents are read.
    pub fn reads_contents(&self) -> bool {
        self.read_only || self.depth_load_op.reads_contents() || self.stencil_load_op.reads_contents()
    }
}
