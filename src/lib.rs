pub mod alert;
pub mod app;
pub mod config;
pub mod decompress;
pub mod domain;
pub mod error;
pub mod feed;
pub mod normalize;
pub mod output;
pub mod persist;
pub mod progress;
pub mod sqlite;
