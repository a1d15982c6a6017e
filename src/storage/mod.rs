mod admin;
mod allocations;
pub mod db;
pub mod models;
mod pool;
pub mod quotes;
mod tables;

pub use admin::LOGIN_PASSWORD_KEY;
pub use db::{end_of_day, Database, StoreError};
pub use tables::*;
