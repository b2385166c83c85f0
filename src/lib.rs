//! Image hosting backend: users register, upload images into a per-user
//! directory and list, fetch or delete them over HTTP.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod state;
pub mod storage;
pub mod users;
