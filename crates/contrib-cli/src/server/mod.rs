//! HTTP server startup and lifecycle management.

mod error;
mod http_server;
mod lifecycle;
mod shutdown;

use self::error::{ServerError, ServerResult};
pub use self::http_server::serve;
pub use self::shutdown::Resources;
