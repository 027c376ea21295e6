use thiserror::Error;

/// Errors raised by the wire codec. These feed into
/// `spec.md` §7's `DecodeFailed` kind at the `mda-net`/`mda-core`
/// boundary; the codec itself stays family-agnostic about what a caller
/// does with a decode failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("buffer too short: need at least {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("unsupported protocol number {0}")]
    UnsupportedProtocol(u8),
    #[error("unrecognised ICMP type/code {icmp_type}/{icmp_code}")]
    UnknownIcmpType { icmp_type: u8, icmp_code: u8 },
}

pub type Result<T> = std::result::Result<T, Error>;
