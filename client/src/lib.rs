mod actions;
mod app;
mod config;
mod crash;
mod dom;
mod persistence;
mod render;
mod state;
mod textures;

pub use app::run;
pub use config::ClientConfig;
