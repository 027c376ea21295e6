use thiserror::Error;

/// Errors surfaced by the socket manager (spec §4.C, §7).
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not acquire a raw socket: {0}")]
    SocketAcquire(#[source] std::io::Error),
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),
    #[error("the kernel send buffer is full, retry on the next writable tick")]
    WouldBlock,
    #[error("decode failed: {0}")]
    DecodeFailed(#[from] mda_packet::Error),
    #[error("no endpoint configured for address family {0}")]
    NoEndpoint(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
