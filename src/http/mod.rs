pub mod handlers;
mod middleware;
mod router;

pub use router::{build_router, AppState};
