use thiserror::Error;

/// The error taxonomy of spec §7, unified across the core crates.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("address resolution failed: {0}")]
    AddressResolution(String),
    #[error("could not acquire sockets: {0}")]
    SocketAcquire(#[source] mda_net::Error),
    #[error("send failed: {0}")]
    SendFailed(#[source] mda_net::Error),
    #[error(transparent)]
    DecodeFailed(#[from] mda_packet::Error),
    #[error("outbound queue is full")]
    QueueFull,
    #[error("algorithm invariant violated: {0}")]
    AlgorithmError(String),
    #[error("event loop I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<mda_net::Error> for Error {
    fn from(err: mda_net::Error) -> Self {
        match err {
            mda_net::Error::SocketAcquire(_) => Self::SocketAcquire(err),
            mda_net::Error::DecodeFailed(e) => Self::DecodeFailed(e),
            other => Self::SendFailed(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
