//! Remote DEM service credentials.

use crate::{TileCache, TrailError};
use log::{debug, warn};
use std::{fmt, str::FromStr};

/// Cache entry holding the last used credentials, base64 encoded.
pub const CREDENTIALS_FILE: &str = "usgs.dat";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns `explicit` after saving it to `cache`, or else the
    /// credentials previously saved there.
    pub fn resolve(explicit: Option<Self>, cache: &TileCache) -> Result<Option<Self>, TrailError> {
        if let Some(credentials) = explicit {
            debug!("saving credentials for {}", credentials.username);
            cache.store(CREDENTIALS_FILE, credentials.to_pair().as_bytes(), true)?;
            return Ok(Some(credentials));
        }
        let Some(raw) = cache.load(CREDENTIALS_FILE, true)? else {
            return Ok(None);
        };
        match String::from_utf8_lossy(&raw).parse::<Self>() {
            Ok(credentials) => {
                debug!("using saved credentials for {}", credentials.username);
                Ok(Some(credentials))
            }
            Err(e) => {
                warn!("ignoring saved credentials: {e}");
                Ok(None)
            }
        }
    }

    fn to_pair(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }
}

impl FromStr for Credentials {
    type Err = TrailError;

    /// Parses `user:password`. The password may itself contain
    /// colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((username, password)) if !username.is_empty() => Ok(Self::new(username, password)),
            _ => Err(TrailError::Credentials),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
