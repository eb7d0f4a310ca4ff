pub mod api;
pub mod codec;
pub mod config;
pub mod cookies;
pub mod event;
pub mod payload;
pub mod prometheus;
pub mod properties;
pub mod proxy;
pub mod router;
pub mod server;
pub mod time;
pub mod token;
pub mod upstream;
