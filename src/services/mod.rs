pub mod auth;
pub mod database;
pub mod documents;
pub mod issues;
pub mod repository;
pub mod uploads;
pub mod users;
