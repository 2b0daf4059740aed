pub mod messages;
pub mod models;
pub mod resolver;
