mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod schema;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod http {
    pub mod handlers;
    pub mod rejection;
    pub mod routes;
}
pub mod config;
mod constants;

pub use authentication::*;
pub use constants::*;
pub use database::*;
pub use http::*;
