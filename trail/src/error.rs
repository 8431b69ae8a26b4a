use crate::http::FetchError;
use plotters::drawing::DrawingAreaErrorKind;
use srtm::SrtmError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrailError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Srtm(#[from] SrtmError),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    #[error("{0}")]
    Base64(#[from] base64::DecodeError),

    #[error("drawing failed: {0}")]
    Drawing(String),

    #[error("invalid cache key {0:?}")]
    CacheKey(String),

    #[error("invalid credentials, expected user:password")]
    Credentials,

    #[error("invalid color {0:?}")]
    Color(String),

    #[error("track {0:?} has no points")]
    EmptyTrack(String),

    #[error("track {0:?} has not been enriched")]
    NotEnriched(String),

    #[error("{0}")]
    InvalidInput(String),
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for TrailError {
    fn from(e: DrawingAreaErrorKind<E>) -> Self {
        Self::Drawing(e.to_string())
    }
}
