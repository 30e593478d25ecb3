//! Alliance API - HTTP layer over the federation engine
//!
//! Every endpoint speaks the same [`dto::ApiResponse`] envelope; domain
//! errors map onto HTTP status codes in [`dto::failure`].

pub mod dto;
pub mod handlers;
pub mod routes;
pub mod state;


pub use routes::create_router;
pub use state::AppState;
