// Business logic and persistence services

pub mod account_service;
pub mod blog_service;
pub mod blog_store;
pub mod database;
pub mod media_host;
pub mod token;
pub mod user_store;
