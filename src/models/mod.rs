pub mod audit;
pub mod credentials;
pub mod mpesa;
pub mod payment;
pub mod shortcode_config;

pub use audit::AuditMetadata;
pub use credentials::{CredentialIdentity, MpesaCredentials, Secret};
pub use payment::{PaymentTransaction, PaymentView, TransactionStatus, TransactionType};
pub use shortcode_config::{ConfigPatch, ConfigResponse, CreateConfigRequest, Environment, ShortcodeConfig, ShortcodeType};
