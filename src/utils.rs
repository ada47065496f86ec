//! Identifier helpers.
//!
//! Every entity id is a uuid7 encoded with bech32 under a human-readable
//! prefix ("company_", "user_", "rule_", "expense_"), so ids stay opaque
//! while remaining self-describing and time-sortable at generation.

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Mint an id under one of the crate's own prefixes. The prefixes are
/// statically known-valid hrps and the payload is a fixed 16 bytes, so
/// encoding cannot fail.
pub fn fresh_id(hrp: &str) -> String {
    let hrp = bech32::Hrp::parse_unchecked(hrp);
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .expect("16-byte uuid payload always encodes")
}
