// Library exports for Inkwell
// Integration tests build the router through these modules.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod pagination;
pub mod response;
pub mod routes;
pub mod slug;
pub mod state;
