use iscr_core::{InvalidYear, Transient};
use iscr_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status} for {url}")]
    Status { status: u16, url: String },
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("malformed document at {url}: {detail}")]
    Malformed { url: String, detail: String },
    #[error("invalid url {url}: {detail}")]
    InvalidUrl { url: String, detail: String },
    #[error(transparent)]
    InvalidYear(#[from] InvalidYear),
    #[error("cache write failed: {0}")]
    Cache(#[from] StoreError),
}

impl Transient for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder() && !e.is_decode(),
            Self::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
