//! Common utilities for render graph integration tests.
//!
//! Every test runs on the dummy backend, which records each command into
//! memory. The helpers here build a device/allocator/queue bundle and pick
//! apart the recorded command stream.

use std::sync::Arc;

use redlilium_graphics::backend::BarrierSplit;
use redlilium_graphics::{
    DummyCommandContext, DummyDevice, DummyQueue, ExecutionReport, GpuResourceHandle, QueueType,
    RecordedCommand, RenderGraph, RenderGraphConfig, RenderGraphError, ResourceState,
    TextureDescriptor, TextureFormat, TextureUsage, TransientAllocator,
};

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Test Context
// ============================================================================

/// Dummy device, transient pool and queue shared by the graphs of one test.
pub struct TestContext {
    pub device: Arc<DummyDevice>,
    pub allocator: TransientAllocator,
    pub queue: DummyQueue,
    pub context: DummyCommandContext,
}

impl TestContext {
    pub fn new() -> Self {
        init_logging();
        let device = Arc::new(DummyDevice::new());
        let allocator = TransientAllocator::new(device.clone());
        Self {
            device,
            allocator,
            queue: DummyQueue::new(QueueType::Graphics),
            context: DummyCommandContext::new(QueueType::Graphics),
        }
    }

    /// Empty graph validated against the dummy device.
    pub fn graph(&self) -> RenderGraph {
        RenderGraph::for_device(self.device.as_ref())
    }

    /// Empty graph with a custom configuration.
    pub fn graph_with(&self, config: RenderGraphConfig) -> RenderGraph {
        self.graph().with_config(config)
    }

    pub fn execute(&mut self, graph: &mut RenderGraph) -> Result<ExecutionReport, RenderGraphError> {
        graph.execute(&self.allocator, &self.queue, &mut self.context)
    }

    /// Commands of the most recent submission.
    pub fn submitted(&self) -> Vec<RecordedCommand> {
        self.queue.last_submission().unwrap_or_default()
    }

    /// Physical handle the dummy device created for the transient `name`.
    pub fn created_handle(&self, name: &str) -> Option<GpuResourceHandle> {
        self.device
            .created_resources()
            .into_iter()
            .find(|created| created.name == name)
            .map(|created| created.handle)
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Full HD RGBA16F texture usable as UAV and SRV.
pub fn hdr_target() -> TextureDescriptor {
    TextureDescriptor::new_2d(
        1920,
        1080,
        TextureFormat::Rgba16Float,
        TextureUsage::UNORDERED_ACCESS | TextureUsage::SHADER_RESOURCE,
    )
}

/// Swapchain-like color target.
pub fn backbuffer_desc() -> TextureDescriptor {
    TextureDescriptor::new_2d(
        1280,
        720,
        TextureFormat::Bgra8Unorm,
        TextureUsage::RENDER_TARGET,
    )
}

/// Sampled color target.
pub fn color_target() -> TextureDescriptor {
    TextureDescriptor::new_2d(
        640,
        360,
        TextureFormat::Rgba8Unorm,
        TextureUsage::RENDER_TARGET | TextureUsage::SHADER_RESOURCE,
    )
}

// ============================================================================
// Command Stream Helpers
// ============================================================================

/// A recorded state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub resource: GpuResourceHandle,
    pub before: ResourceState,
    pub after: ResourceState,
    pub split: BarrierSplit,
}

/// Every transition in `commands`, in recording order.
pub fn transitions(commands: &[RecordedCommand]) -> Vec<Transition> {
    commands
        .iter()
        .filter_map(|command| match *command {
            RecordedCommand::Transition {
                resource,
                before,
                after,
                split,
            } => Some(Transition {
                resource,
                before,
                after,
                split,
            }),
            _ => None,
        })
        .collect()
}

/// Transitions touching `resource`.
pub fn transitions_of(commands: &[RecordedCommand], resource: GpuResourceHandle) -> Vec<Transition> {
    transitions(commands)
        .into_iter()
        .filter(|t| t.resource == resource)
        .collect()
}

pub fn uav_barriers(commands: &[RecordedCommand]) -> Vec<GpuResourceHandle> {
    commands
        .iter()
        .filter_map(|command| match *command {
            RecordedCommand::UavBarrier { resource } => Some(resource),
            _ => None,
        })
        .collect()
}

pub fn aliasing_barriers(commands: &[RecordedCommand]) -> Vec<GpuResourceHandle> {
    commands
        .iter()
        .filter_map(|command| match *command {
            RecordedCommand::AliasingBarrier { after, .. } => Some(after),
            _ => None,
        })
        .collect()
}

/// Index of the n-th dispatch in `commands`.
pub fn dispatch_index(commands: &[RecordedCommand], n: usize) -> Option<usize> {
    commands
        .iter()
        .enumerate()
        .filter(|(_, command)| matches!(command, RecordedCommand::Dispatch { .. }))
        .nth(n)
        .map(|(index, _)| index)
}

/// Count commands matching `predicate`.
pub fn count(commands: &[RecordedCommand], predicate: impl Fn(&RecordedCommand) -> bool) -> usize {
    commands.iter().filter(|command| predicate(command)).count()
}

/// No transition may leave a resource in the state it was already in.
pub fn assert_no_redundant_transitions(commands: &[RecordedCommand]) {
    for transition in transitions(commands) {
        assert_ne!(
            transition.before, transition.after,
            "redundant transition recorded: {transition:?}"
        );
    }
}
