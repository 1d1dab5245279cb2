//! Wire types exchanged between the broadcaster and orchestrators
//!
//! These are the transient payloads of the orchestrator-info probe and the
//! transcode result plane. Persistent state lives in [`crate::db`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 20-byte registry identity of an orchestrator.
///
/// Rendered as `0x`-prefixed lowercase hex everywhere (logs, store rows).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrchAddress(pub [u8; 20]);

impl OrchAddress {
    /// Parse a `0x`-prefixed (or bare) 40-digit hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)
            .map_err(|e| Error::InvalidInput(format!("bad orchestrator address {s:?}: {e}")))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| Error::InvalidInput(format!("orchestrator address {s:?} is not 20 bytes")))?;
        Ok(Self(bytes))
    }

    /// Address with the low 8 bytes set from `n`, big-endian.
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for OrchAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for OrchAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrchAddress({})", self.to_hex())
    }
}

/// Advertised price as a rational: `price_per_unit / pixels_per_unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceInfo {
    pub price_per_unit: i64,
    pub pixels_per_unit: i64,
}

/// Payment-ticket parameters issued by an orchestrator.
///
/// Opaque to the discovery core; forwarded verbatim to the ticket validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketParams {
    #[serde(default)]
    pub recipient: Vec<u8>,
    #[serde(default)]
    pub face_value: Vec<u8>,
    #[serde(default)]
    pub win_prob: Vec<u8>,
    #[serde(default)]
    pub seed: Vec<u8>,
}

/// Probe response from an orchestrator's service URI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorInfo {
    /// Display identity of the transcoder behind the service URI.
    #[serde(default)]
    pub transcoder: String,
    #[serde(default)]
    pub price_info: Option<PriceInfo>,
    #[serde(default)]
    pub ticket_params: Option<TicketParams>,
    /// Opaque session bytes consumed by the stream data plane.
    #[serde(default)]
    pub auth_token: Vec<u8>,
}

/// One rendition produced by a transcode job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodedSegmentData {
    pub url: String,
    pub pixels: i64,
}

/// Full result set of a transcode job, one entry per rendition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeData {
    pub segments: Vec<TranscodedSegmentData>,
}
