pub mod auth;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod ws;

pub use config::Config;
pub use routes::build_router;
pub use state::AppState;
