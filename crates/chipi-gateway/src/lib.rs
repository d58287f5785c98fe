pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod pages;
pub mod router;
pub mod server;
pub mod session;
pub mod state;

pub use server::GatewayServer;
