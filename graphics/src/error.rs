//! Render graph error types.

use std::fmt;

use crate::backend::BackendError;

/// Errors reported while building, compiling or executing a render graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderGraphError {
    /// A resource descriptor violates the device capabilities.
    InvalidDescriptor { resource: String, reason: String },
    /// A handle does not belong to this graph.
    InvalidHandle { context: String },
    /// A record closure touched a resource its pass did not declare.
    UndeclaredAccess { pass: String, resource: String },
    /// A pass declares incompatible uses of one resource.
    ConflictingPassAccess {
        pass: String,
        resource: String,
        reason: String,
    },
    /// An exported resource is never written.
    ExportWithoutProducer { resource: String },
    /// The device failed to create a physical resource.
    AllocationFailed {
        resource: String,
        descriptor: String,
        source: BackendError,
    },
    /// An explicit dependency contradicts the insertion-order schedule.
    CycleDetected { pass: String, dependency: String },
    /// The graph has already been executed; reset it before reuse.
    AlreadyExecuted,
}

impl fmt::Display for RenderGraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDescriptor { resource, reason } => {
                write!(f, "invalid descriptor for '{resource}': {reason}")
            }
            Self::InvalidHandle { context } => write!(f, "invalid handle: {context}"),
            Self::UndeclaredAccess { pass, resource } => {
                write!(f, "pass '{pass}' accessed undeclared resource '{resource}'")
            }
            Self::ConflictingPassAccess {
                pass,
                resource,
                reason,
            } => write!(
                f,
                "pass '{pass}' has conflicting access to '{resource}': {reason}"
            ),
            Self::ExportWithoutProducer { resource } => {
                write!(f, "exported resource '{resource}' is never written")
            }
            Self::AllocationFailed {
                resource,
                descriptor,
                source,
            } => write!(
                f,
                "failed to allocate '{resource}' ({descriptor}): {source}"
            ),
            Self::CycleDetected { pass, dependency } => write!(
                f,
                "pass '{pass}' depends on '{dependency}', which does not run before it"
            ),
            Self::AlreadyExecuted => write!(f, "render graph was already executed"),
        }
    }
}

impl std::error::Error for RenderGraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AllocationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
