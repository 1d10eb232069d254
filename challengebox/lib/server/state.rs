//! Server state management.

use std::sync::Arc;

use crate::{lifecycle::LifecycleManager, platform::OwnerResolver};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Shared server state: the lifecycle manager and the way callers are identified.
#[derive(Clone)]
pub struct ServerState {
    /// The shared lifecycle manager
    lifecycle: Arc<LifecycleManager>,

    /// Turns request headers into a session
    resolver: Arc<dyn OwnerResolver>,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl ServerState {
    /// Creates a new ServerState instance
    pub fn new(lifecycle: Arc<LifecycleManager>, resolver: Arc<dyn OwnerResolver>) -> Self {
        Self {
            lifecycle,
            resolver,
        }
    }

    /// Gets the lifecycle manager
    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// Gets the owner resolver
    pub fn resolver(&self) -> &Arc<dyn OwnerResolver> {
        &self.resolver
    }
}
