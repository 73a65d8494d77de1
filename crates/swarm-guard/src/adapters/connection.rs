//! Connection state shared by every client adapter.

use reqwest::Url;
use tracing::debug;

use crate::config::GuardConfig;
use crate::transport::{BasicAuth, SessionTransport, TransportError};

/// Where the client lives and how to authenticate against it.
#[derive(Debug)]
pub struct ClientConnection {
    pub(crate) transport: SessionTransport,
    base_url: String,
    username: String,
    password: String,
}

impl ClientConnection {
    pub fn from_config(config: &GuardConfig) -> Result<Self, TransportError> {
        let mut connection = Self {
            transport: SessionTransport::new(config.request_timeout())?,
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
        };
        connection.apply_config(config)?;
        Ok(connection)
    }

    /// Pick up URL, credentials and timeout from a reloaded config.
    ///
    /// Cookies and the cached session token are kept.
    pub fn apply_config(&mut self, config: &GuardConfig) -> Result<(), TransportError> {
        self.transport.set_timeout(config.request_timeout())?;
        self.base_url = config.client_url.trim_end_matches('/').to_string();
        self.username = config.client_username.clone();
        self.password = config.client_password.clone();

        let basic_auth = config.use_basic_auth.then(|| BasicAuth {
            username: config.client_username.clone(),
            password: config.client_password.clone(),
        });
        self.transport.set_basic_auth(basic_auth);
        debug!(url = %self.base_url, "Client connection configured");
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Absolute URL for `path` (which starts with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn transport(&self) -> &SessionTransport {
        &self.transport
    }
}

/// `application/x-www-form-urlencoded` body for `pairs`.
pub(crate) fn form_encode(pairs: &[(&str, &str)]) -> String {
    Url::parse_with_params("http://localhost/", pairs)
        .ok()
        .and_then(|url| url.query().map(str::to_string))
        .unwrap_or_default()
}
