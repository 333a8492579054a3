pub mod activity;
pub mod app;
pub mod autosave;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod kv;
pub mod models;
pub mod persistence;
pub mod render;
pub mod settings;
pub mod share;
pub mod state;
pub mod stats;
pub mod store;
pub mod tracker;
pub mod ui;

pub use app::router;
pub use config::Config;
pub use persistence::PersistenceGateway;
pub use state::AppState;
pub use tracker::Tracker;
