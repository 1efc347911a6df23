use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{}: corrupt or truncated data", .0.display())]
    Corrupt(PathBuf),
    #[error("{} is not accessible", .path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not implemented")]
    NotImplemented(String),
    #[error("missing required option {0}.{1}")]
    MissingOption(String, String),
    #[error("invalid value for {0}.{1}: {2}")]
    BadOption(String, String, String),
    #[error("report sink failure: {0}")]
    Report(String),
    #[error("I/O error")]
    Io(#[from] io::Error),
}

