pub mod auth;
pub mod rate_limit;
pub mod response;
pub mod security_headers;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use rate_limit::{rate_limit_middleware, upload_rate_limit_middleware, RateLimiter};
pub use response::{ApiResponse, ApiResult, Pagination};
pub use security_headers::with_security_headers;
