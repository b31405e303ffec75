use std::fmt;

use super::shortcode_config::Environment;

/// Holds a sensitive value; formatting never prints it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret<T>
where
    T: Clone + Default,
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Secret::new(value)
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Secret::new(value.to_string())
    }
}

/// Cache key for everything issued per merchant credential set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialIdentity {
    pub shortcode: String,
    pub environment: Environment,
}

impl fmt::Display for CredentialIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shortcode, self.environment)
    }
}

/// Decrypted gateway credentials for one shortcode.
#[derive(Debug, Clone)]
pub struct MpesaCredentials {
    pub shortcode: String,
    pub environment: Environment,
    pub consumer_key: Secret<String>,
    pub consumer_secret: Secret<String>,
    pub passkey: Option<Secret<String>>,
    pub security_credential: Option<Secret<String>>,
}

impl MpesaCredentials {
    pub fn identity(&self) -> CredentialIdentity {
        CredentialIdentity {
            shortcode: self.shortcode.clone(),
            environment: self.environment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let credentials = MpesaCredentials {
            shortcode: "174379".into(),
            environment: Environment::Sandbox,
            consumer_key: "my-key".into(),
            consumer_secret: "my-secret".into(),
            passkey: Some("my-passkey".into()),
            security_credential: None,
        };

        let printed = format!("{:?}", credentials);
        assert!(printed.contains("174379"));
        assert!(!printed.contains("my-key"));
        assert!(!printed.contains("my-secret"));
        assert!(!printed.contains("my-passkey"));
        assert_eq!(credentials.consumer_key.reveal(), "my-key");
    }
}
