//! Application state for the web layer.

use crate::poller::Poller;

/// Shared application state.
pub struct AppState<F> {
    /// The poller owning the feed client and published state.
    pub poller: Poller<F>,
}

impl<F> AppState<F> {
    pub fn new(poller: Poller<F>) -> Self {
        Self { poller }
    }
}

impl<F> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            poller: self.poller.clone(),
        }
    }
}
