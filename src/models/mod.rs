// Domain models shared by handlers and services

pub mod blog;
pub mod errors;
pub mod pagination;
pub mod user;
