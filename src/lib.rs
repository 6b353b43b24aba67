pub mod adapter;
pub mod api;
pub mod channel;
pub mod cli;
pub mod color;
pub mod config;
pub mod model;
pub mod server;
pub mod store;
pub mod sync;
pub mod view;

pub use server::{create_router, OriginPolicy};
