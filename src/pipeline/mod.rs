pub mod config;
pub mod persistence;
pub mod project;
pub mod score;
