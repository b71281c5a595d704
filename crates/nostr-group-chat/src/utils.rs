use crate::{Error, Result};
use nostr::PublicKey;
use std::time::{SystemTime, UNIX_EPOCH};

/// Parse a network address (hex or npub) into a public key.
pub fn parse_address(address: &str) -> Result<PublicKey> {
    PublicKey::parse(address.trim()).map_err(|e| Error::InvalidAddress(format!("{address}: {e}")))
}

pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
