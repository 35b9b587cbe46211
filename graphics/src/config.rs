//! Render graph configuration.

/// What the executor does when a pass fails during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorPolicy {
    /// Stop executing, release acquired resources and return the error.
    #[default]
    Abort,
    /// Log the error, skip the offending pass and continue.
    BestEffort,
}

/// Build-time options of a [`RenderGraph`](crate::RenderGraph).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderGraphConfig {
    /// Behavior on execute-time errors.
    pub error_policy: ErrorPolicy,
    /// Begin transitions right after a resource's previous use when at least
    /// one pass separates it from the next use.
    pub split_barriers: bool,
    /// Record lookups of undeclared resources made through
    /// [`PassResources`](crate::PassResources).
    pub validate_access: bool,
}

impl Default for RenderGraphConfig {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::default(),
            split_barriers: false,
            validate_access: cfg!(debug_assertions),
        }
    }
}

impl RenderGraphConfig {
    /// Set the execute error policy.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Enable or disable split barriers.
    pub fn with_split_barriers(mut self, enabled: bool) -> Self {
        self.split_barriers = enabled;
        self
    }

    /// Enable or disable undeclared access validation.
    pub fn with_access_validation(mut self, enabled: bool) -> Self {
        self.validate_access = enabled;
        self
    }
}
