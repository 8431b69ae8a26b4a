//! Blocking HTTP access to tile and DEM services.

use crate::Credentials;
use log::debug;
use reqwest::{
    blocking::{Client, Response},
    header::LOCATION,
    redirect::Policy,
    Url,
};
use std::time::Duration;
use thiserror::Error;

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("unable to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("invalid URL {url}: {reason}")]
    Url { url: String, reason: String },

    #[error("more than {MAX_REDIRECTS} redirects from {0}")]
    TooManyRedirects(String),
}

/// Something able to GET a URL's body.
///
/// Allows injecting a fake remote service in tests.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Plain client for map tile servers.
pub struct TileClient {
    client: Client,
}

impl TileClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl HttpClient for TileClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().map_err(|source| FetchError::Transport {
            url: url.to_owned(),
            source,
        })?;
        read_body(response, url)
    }
}

/// Client for the authenticated DEM service.
///
/// Keeps a cookie session and follows redirects itself so that
/// credentials only travel between the origin and the
/// authentication host.
pub struct EarthdataClient {
    client: Client,
    credentials: Option<Credentials>,
    auth_host: String,
}

impl EarthdataClient {
    pub fn new(credentials: Option<Credentials>, auth_host: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .redirect(Policy::none())
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            credentials,
            auth_host: auth_host.to_owned(),
        })
    }
}

impl HttpClient for EarthdataClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut current = parse_url(url)?;
        let mut credentials = self.credentials.as_ref();
        for _ in 0..=MAX_REDIRECTS {
            let mut request = self.client.get(current.clone());
            if let Some(Credentials { username, password }) = credentials {
                request = request.basic_auth(username, Some(password));
            }
            let response = request.send().map_err(|source| FetchError::Transport {
                url: current.to_string(),
                source,
            })?;
            if !response.status().is_redirection() {
                return read_body(response, current.as_str());
            }
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| FetchError::Status {
                    url: current.to_string(),
                    status: response.status().as_u16(),
                })?;
            let next = current.join(location).map_err(|e| FetchError::Url {
                url: location.to_owned(),
                reason: e.to_string(),
            })?;
            if credentials.is_some() && !keep_credentials(&current, &next, &self.auth_host) {
                debug!(
                    "dropping credentials on redirect to {}",
                    next.host_str().unwrap_or_default()
                );
                credentials = None;
            }
            current = next;
        }
        Err(FetchError::TooManyRedirects(url.to_owned()))
    }
}

/// Returns `true` if credentials sent to `previous` may also be sent
/// to `next`.
///
/// That is the case when both share a host, or when either one is the
/// authentication host.
pub fn keep_credentials(previous: &Url, next: &Url, auth_host: &str) -> bool {
    let (previous, next) = (previous.host_str(), next.host_str());
    previous == next || previous == Some(auth_host) || next == Some(auth_host)
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    Url::parse(url).map_err(|e| FetchError::Url {
        url: url.to_owned(),
        reason: e.to_string(),
    })
}

fn read_body(response: Response, url: &str) -> Result<Vec<u8>, FetchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_owned(),
            status: status.as_u16(),
        });
    }
    let body = response.bytes().map_err(|source| FetchError::Transport {
        url: url.to_owned(),
        source,
    })?;
    Ok(body.to_vec())
}
