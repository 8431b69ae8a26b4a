use thiserror::Error;

#[derive(Error, Debug)]
pub enum SrtmError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid SRTM cell name {0:?}")]
    CellName(String),

    #[error("archive has no member named {0}")]
    MissingMember(String),

    #[error("invalid HGT len {0} for {1}, expected {2}")]
    HgtLen(usize, String, usize),
}
