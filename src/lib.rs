//! M-Pesa Daraja gateway core: credential registry, token broker,
//! transaction engine and the filter engine behind payment search.

pub mod clock;
pub mod config;
pub mod database;
pub mod dtos;
pub mod errors;
pub mod filter;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use errors::{AppError, Result};
