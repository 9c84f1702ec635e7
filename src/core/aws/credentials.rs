use crate::core::collectors::CollectorError;

pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";

/// Static AWS credentials used to sign requests.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Read the standard `AWS_*` environment variables.
    pub fn from_env() -> Result<Self, CollectorError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve credentials through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CollectorError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let access_key_id = non_empty(ACCESS_KEY_ENV)
            .ok_or_else(|| CollectorError::Config(format!("{ACCESS_KEY_ENV} is not set")))?;
        let secret_access_key = non_empty(SECRET_KEY_ENV)
            .ok_or_else(|| CollectorError::Config(format!("{SECRET_KEY_ENV} is not set")))?;

        let credentials = Self::new(access_key_id, secret_access_key);
        Ok(match non_empty(SESSION_TOKEN_ENV) {
            Some(token) => credentials.with_session_token(token),
            None => credentials,
        })
    }
}
