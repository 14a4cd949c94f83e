pub mod bindings;
pub mod cache;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod image;
pub mod params;
pub mod pipelines;
pub mod provider;
pub mod shaders;
pub mod types;
pub mod warmup;
