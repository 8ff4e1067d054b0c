pub mod access;
pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod messages;
pub mod notifications;
pub mod projects;
pub mod tasks;
pub mod users;

pub use config::ServerConfig;
pub use connection::Server;
pub use database::Database;
pub use error::{ServiceError, ServiceResult};
