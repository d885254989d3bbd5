pub mod aggregate;
pub mod cache;
pub mod calendar;
pub mod db;
pub mod models;
pub mod service;
pub mod store;
pub mod sync;
