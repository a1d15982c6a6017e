pub mod admin;
pub mod generator;

pub use admin::AdminError;
pub use generator::generate_token;
