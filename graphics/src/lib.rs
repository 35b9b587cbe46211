//! # RedLilium Graphics
//!
//! Frame-scoped render graph for explicit GPU APIs.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderGraph`] - Declarative description of passes and the virtual
//!   resources they read and write
//! - [`TransientAllocator`] - Pool of physical resources shared by graphs
//! - [`BarrierPlanner`] - Resource state tracking and barrier generation
//! - [`backend`] - The device, command context and queue traits a GPU
//!   backend implements, plus a recording dummy backend for tests
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_graphics::{PassFlags, RenderGraph, TransientAllocator};
//!
//! let allocator = TransientAllocator::new(device.clone());
//! let mut graph = RenderGraph::for_device(device.as_ref());
//! let lit = graph.create_texture("lit", desc)?;
//! graph
//!     .add_pass("lighting", PassFlags::COMPUTE)
//!     .write(lit)
//!     .bind(|ctx, _| ctx.dispatch(120, 68, 1));
//! graph.export(lit, ResourceState::ALL_SHADER_RESOURCE)?;
//! let report = graph.execute(&allocator, queue.as_ref(), context.as_mut())?;
//! ```

pub mod allocator;
pub mod backend;
pub mod barrier;
pub mod compiler;
pub mod config;
pub mod debug;
pub mod error;
pub mod executor;
pub mod graph;
pub mod profiling;
pub mod types;

// Re-export main types for convenience
pub use allocator::{Acquisition, AllocatorStats, PhysicalId, PhysicalStatus, TransientAllocator};
pub use backend::{
    BackendError, CommandContext, CommandQueue, Device, GpuResourceHandle, QueueType,
    RenderPassInfo, SyncPoint, ViewHandle,
};
#[cfg(any(test, feature = "dummy"))]
pub use backend::dummy::{DummyCommandContext, DummyDevice, DummyQueue, RecordedCommand};
pub use barrier::{Barrier, BarrierBatch, BarrierPlanner, BarrierStats};
pub use compiler::{CompiledGraph, CompiledPass, ResolvedAccess};
pub use config::{ErrorPolicy, RenderGraphConfig};
pub use debug::DumpFiles;
pub use error::RenderGraphError;
pub use executor::ExecutionReport;
pub use graph::{
    Blackboard, BufferHandle, DepthStencilBinding, ExportReceiver, ExportedResource, LoadOp,
    PassBuilder, PassFlags, PassHandle, PassResources, RenderGraph, RenderTargetBinding,
    ResourceAccess, ResourceHandle, StoreOp, TextureHandle,
};
pub use types::{
    BufferDescriptor, BufferUsage, ClearValue, DeviceCapabilities, Extent3d, ResourceDescriptor,
    ResourceState, TextureDescriptor, TextureDimension, TextureFormat, TextureUsage,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// Only logs the crate version; kept so applications have one place to
/// hook graphics start-up.
pub fn init() {
    log::info!("RedLilium Graphics v{} initialized", VERSION);
}
