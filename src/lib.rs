pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod proxy;
pub mod web;
