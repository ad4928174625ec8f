// Library interface for testing

// Declare all modules
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod events;
pub mod gateway;
pub mod hub;
pub mod models;
pub mod pipeline;
pub mod queries;
pub mod schema;
pub mod serve;
pub mod store;
pub mod tasks;
pub mod ws;

// Re-export the embedding dimension for convenience
pub use constants::EMBED_DIM;
