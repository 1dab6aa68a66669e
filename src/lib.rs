pub mod app;
pub mod config;
pub mod converter;
pub mod domain;
pub mod error;
pub mod layout;
pub mod output;
pub mod report;
pub mod sheet;
