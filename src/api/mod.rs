pub mod client_ip;
pub mod handlers;
pub mod response;
mod routes;

pub use routes::create_router;
