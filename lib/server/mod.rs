//! Ambient HTTP surface (A1): a thin Axum router exposing the Reconciler/Scheduler/Tag
//! Deleter contract, plus read-only pass-through listing of the Persistence Port.

mod handlers;
mod routes;
mod state;
mod types;

pub use routes::create_router;
pub use state::ServerState;
