pub mod config_handlers;
pub mod mpesa_handlers;
