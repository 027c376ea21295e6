//! Algorithm options (spec §6): range-checked at construction, never at
//! use, matching the defaults the original `traceroute.h` hardcodes.

use crate::error::{Error, Result};

pub const MIN_TTL_DEFAULT: u8 = 1;
pub const MAX_TTL_DEFAULT: u8 = 30;
pub const NUM_QUERIES_DEFAULT: u8 = 3;
pub const MAX_UNDISCOVERED_DEFAULT: u8 = 3;
/// The original hardcodes `MAX_TTLS = 5` in one header and `255` in
/// another (spec §9 open question); this specification settles on 255,
/// the actual protocol-level bound on a TTL byte.
pub const MAX_TTL_BOUND: u8 = 255;

#[derive(Debug, Clone, PartialEq)]
pub struct TracerouteOptions {
    pub min_ttl: u8,
    pub max_ttl: u8,
    pub num_probes: u8,
    pub max_undiscovered: u8,
    pub do_resolv: bool,
    pub print_ttl: bool,
    pub resolv_asn: bool,
}

impl Default for TracerouteOptions {
    fn default() -> Self {
        Self {
            min_ttl: MIN_TTL_DEFAULT,
            max_ttl: MAX_TTL_DEFAULT,
            num_probes: NUM_QUERIES_DEFAULT,
            max_undiscovered: MAX_UNDISCOVERED_DEFAULT,
            do_resolv: true,
            print_ttl: false,
            resolv_asn: false,
        }
    }
}

impl TracerouteOptions {
    /// Validates the documented ranges (spec §6): `min_ttl`, `max_ttl`,
    /// `num_probes` and `max_undiscovered` all lie in `[1, 255]`, and
    /// `min_ttl <= max_ttl`.
    pub fn validate(&self) -> Result<()> {
        if self.min_ttl == 0 {
            return Err(Error::InvalidOption("min_ttl must be >= 1".into()));
        }
        if self.max_ttl == 0 {
            return Err(Error::InvalidOption("max_ttl must be >= 1".into()));
        }
        if self.min_ttl > self.max_ttl {
            return Err(Error::InvalidOption("min_ttl must be <= max_ttl".into()));
        }
        if self.num_probes == 0 {
            return Err(Error::InvalidOption("num_probes must be >= 1".into()));
        }
        if self.max_undiscovered == 0 {
            return Err(Error::InvalidOption("max_undiscovered must be >= 1".into()));
        }
        Ok(())
    }
}

/// Matches the original `mda/flow.c`/`ttl_flow.c` retry constant (spec
/// §11 "Retry bound on flow timeouts").
pub const MAX_FLOW_RETRIES_DEFAULT: u8 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct MdaOptions {
    pub traceroute: TracerouteOptions,
    pub confidence: f64,
    pub max_branching: u8,
    /// How many times a timed-out flow is reprobed before its hop gives
    /// up and accepts it as an unresolved (star) branch.
    pub max_flow_retries: u8,
}

impl Default for MdaOptions {
    fn default() -> Self {
        Self {
            traceroute: TracerouteOptions::default(),
            confidence: 0.05,
            max_branching: 10,
            max_flow_retries: MAX_FLOW_RETRIES_DEFAULT,
        }
    }
}

impl MdaOptions {
    /// `confidence_α ∈ (0,1)`, `max_branching K ∈ [2,64]` (spec §6).
    pub fn validate(&self) -> Result<()> {
        self.traceroute.validate()?;
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(Error::InvalidOption(
                "confidence must lie strictly between 0 and 1".into(),
            ));
        }
        if !(2..=64).contains(&self.max_branching) {
            return Err(Error::InvalidOption(
                "max_branching must lie in [2, 64]".into(),
            ));
        }
        Ok(())
    }
}
