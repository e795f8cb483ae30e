//! HTTP API over the published state.
//!
//! Read endpoints expose the current stations, counters and history;
//! control endpoints trigger a refresh or start/stop the poll loop.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::create_router;
pub use state::AppState;
