pub mod api_server;
pub mod session;
pub mod wizard;
