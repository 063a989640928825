pub mod admin;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod workers;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
