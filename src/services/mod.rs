pub mod config_service;
pub mod daraja_client;
pub mod encryption;
pub mod mpesa_service;
pub mod token_broker;
pub mod url_registration;

pub use config_service::CredentialRegistry;
pub use daraja_client::{DarajaClient, HttpDarajaClient};
pub use encryption::TextEncryptor;
pub use mpesa_service::MpesaPaymentService;
pub use token_broker::TokenBroker;
pub use url_registration::{ChannelNotifier, UrlRegistrationEvent, UrlRegistrationNotifier, UrlRegistrationWorker};
