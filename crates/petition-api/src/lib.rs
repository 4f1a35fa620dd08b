pub mod credentials;
pub mod error;
pub mod extract;
pub mod health;
pub mod middleware;
pub mod petitions;
pub mod photos;
pub mod router;
pub mod signatures;
pub mod state;
pub mod users;

pub use error::{ApiError, ApiResult};
pub use router::build_router;
pub use state::{AppState, AppStateInner};
