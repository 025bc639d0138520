//! Core library: catalog scanning, category store, triage engine, export.

pub mod catalog;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod models;
pub mod service;
pub mod session;
pub mod store;

pub use error::TriageError;
pub use models::{Category, Item};
