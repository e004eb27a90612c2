//! Shared context installed in a host application's extension state on attach.

use crate::processors::Processors;
use crate::service::Session;
use std::fmt;
use std::sync::Arc;

/// Session and universal hooks shared by every group a manager builds.
/// Its presence in a host's extensions marks the host as initialized.
#[derive(Clone)]
pub struct ApiContext {
    pub session: Arc<dyn Session>,
    pub processors: Processors,
}

impl ApiContext {
    pub fn new(session: Arc<dyn Session>, processors: Processors) -> Self {
        ApiContext {
            session,
            processors,
        }
    }
}

impl fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiContext")
            .field("processors", &self.processors)
            .finish_non_exhaustive()
    }
}
