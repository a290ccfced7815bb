pub mod api;
pub mod auth;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod notifier;
pub mod repo;
pub mod telemetry;
