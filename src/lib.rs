pub mod assets;
pub mod chat;
pub mod company;
pub mod config;
pub mod cors;
pub mod fallback;
pub mod identity;
pub mod observability;
pub mod ratelimit;
pub mod server;
