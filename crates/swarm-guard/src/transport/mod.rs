//! # Session-Resilient Transport
//!
//! Authenticated GET/POST towards the torrent client's Web API.
//!
//! Every request carries the fixed user agent and any caller headers. Writes
//! default to `application/x-www-form-urlencoded`. When the backend uses a
//! session header (CSRF token) and one is cached it is attached, and HTTP
//! basic auth is added when configured and the caller asks for auth.
//!
//! Responses are classified identically for GET and POST:
//!
//! | status | outcome |
//! |--------|---------|
//! | 200 | body returned |
//! | 401 | [`TransportError::Unauthorized`] |
//! | 403 | [`TransportError::Forbidden`] |
//! | 404 | [`TransportError::NotFound`] |
//! | 409 | token cached + [`TransportError::SessionTokenRefreshed`], else [`TransportError::Conflict`] |
//! | other | [`TransportError::UnexpectedStatus`] |
//!
//! Re-login on 403/409 is driven by the backend, which owns the login call.

mod error;


pub use error::TransportError;

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, CONTENT_TYPE, USER_AGENT as USER_AGENT_HEADER};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, warn};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("swarm-guard/", env!("CARGO_PKG_VERSION"));

/// Content type applied to writes unless the caller sets one.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Credentials for HTTP basic auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Per-request knobs.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers, applied after the user agent.
    pub headers: Vec<(String, String)>,
    /// Attach the session header and basic auth when available.
    pub with_auth: bool,
    /// Ask the backend to re-login on 403/409.
    pub try_login: bool,
}

impl RequestOptions {
    /// Authenticated request that re-logs in on 403/409.
    pub fn authenticated() -> Self {
        Self {
            with_auth: true,
            try_login: true,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// HTTP client with a persistent cookie jar and cached session token.
#[derive(Debug)]
pub struct SessionTransport {
    client: Client,
    cookies: Arc<Jar>,
    timeout: Duration,
    basic_auth: Option<BasicAuth>,
    session_header: Option<&'static str>,
    session_token: Option<String>,
}

impl SessionTransport {
    /// Create a transport with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let cookies = Arc::new(Jar::default());
        let client = build_client(&cookies, timeout)?;
        Ok(Self {
            client,
            cookies,
            timeout,
            basic_auth: None,
            session_header: None,
            session_token: None,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Rebuild the client for a new timeout. Cookies survive the rebuild.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if timeout == self.timeout {
            return Ok(());
        }
        self.client = build_client(&self.cookies, timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    pub fn set_basic_auth(&mut self, basic_auth: Option<BasicAuth>) {
        self.basic_auth = basic_auth;
    }

    /// Name of the CSRF/session header the active backend requires, if any.
    pub fn set_session_header(&mut self, header: Option<&'static str>) {
        self.session_header = header;
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn set_session_token(&mut self, token: Option<String>) {
        self.session_token = token;
    }

    /// Authenticated-or-not GET.
    pub async fn get(&mut self, url: &str, options: &RequestOptions) -> Result<String, TransportError> {
        self.send(Method::GET, url, None, options).await
    }

    /// POST with `body`; form-encoded unless the caller overrides the type.
    pub async fn post(
        &mut self,
        url: &str,
        body: String,
        options: &RequestOptions,
    ) -> Result<String, TransportError> {
        self.send(Method::POST, url, Some(body), options).await
    }

    async fn send(
        &mut self,
        method: Method,
        url: &str,
        body: Option<String>,
        options: &RequestOptions,
    ) -> Result<String, TransportError> {
        let request = self.build_request(method.clone(), url, body, options)?;

        let response = self.client.execute(request).await.map_err(|e| {
            warn!(%method, url, error = %e, "Request failed");
            TransportError::Request(e)
        })?;

        let status = response.status();
        let refreshed_token = self
            .session_header
            .and_then(|name| header_value(response.headers(), name));

        let body = response.text().await.map_err(|e| {
            warn!(%method, url, error = %e, "Failed to read response");
            TransportError::Body(e)
        })?;

        match classify(status, refreshed_token.is_some()) {
            Ok(()) => Ok(body),
            Err(TransportError::SessionTokenRefreshed) => {
                if let Some(token) = refreshed_token {
                    debug!("Session token refreshed");
                    self.session_token = Some(token);
                }
                Err(TransportError::SessionTokenRefreshed)
            }
            Err(e) => {
                warn!(%method, url, error = %e, "Request rejected");
                Err(e)
            }
        }
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
        options: &RequestOptions,
    ) -> Result<reqwest::Request, TransportError> {
        let is_write = method == Method::POST;
        let mut builder = self
            .client
            .request(method, url)
            .header(USER_AGENT_HEADER, USER_AGENT);

        let mut content_type_set = false;
        for (name, value) in &options.headers {
            if name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
                content_type_set = true;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if is_write && !content_type_set {
            builder = builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE);
        }

        if options.with_auth {
            if let (Some(name), Some(token)) = (self.session_header, &self.session_token) {
                builder = builder.header(name, token.as_str());
            }
            if let Some(auth) = &self.basic_auth {
                if !auth.username.is_empty() {
                    builder = builder.basic_auth(&auth.username, Some(&auth.password));
                }
            }
        }

        if let Some(body) = body {
            builder = builder.body(body);
        }

        builder.build().map_err(|e| {
            debug!(url, error = %e, "Failed to build request");
            TransportError::Build(e.to_string())
        })
    }
}

/// Map a response status to success or a transport error.
///
/// `token_present` tells whether a 409 carried a fresh session token.
pub fn classify(status: StatusCode, token_present: bool) -> Result<(), TransportError> {
    match status.as_u16() {
        200 => Ok(()),
        401 => Err(TransportError::Unauthorized),
        403 => Err(TransportError::Forbidden),
        404 => Err(TransportError::NotFound),
        409 if token_present => Err(TransportError::SessionTokenRefreshed),
        409 => Err(TransportError::Conflict),
        code => Err(TransportError::UnexpectedStatus(code)),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn build_client(cookies: &Arc<Jar>, timeout: Duration) -> Result<Client, TransportError> {
    Client::builder()
        .timeout(timeout)
        .cookie_provider(Arc::clone(cookies))
        .build()
        .map_err(|e| TransportError::Build(e.to_string()))
}
