use crate::context::SharedContext;
use crate::session::SessionHandle;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single voice session owned by this client
    pub session: SessionHandle,

    /// Location, language and local data for the next session
    pub context: SharedContext,
}

impl AppState {
    pub fn new(session: SessionHandle, context: SharedContext) -> Self {
        Self { session, context }
    }
}
