pub mod admin;
pub mod auth;
pub mod chats;
pub mod contacts;
pub mod error;
pub mod groups;
pub mod middleware;
pub mod settings;
pub mod uploads;
