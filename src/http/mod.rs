//! HTTP surface: the admission middleware, the standalone router and the server.

mod middleware;
mod routes;
mod server;

pub use middleware::{admission_middleware, AdmissionState, Admitted};
pub use routes::router;
pub use server::HttpServer;
