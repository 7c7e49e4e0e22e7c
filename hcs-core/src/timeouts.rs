//! Per-operation timeouts
//!
//! Resources declare default timeouts; users override them through a
//! `timeouts` map attribute (`{ create = "5m", delete = "1h30m" }`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::attrs::Attrs;
use crate::provider::{ProviderError, ProviderResult};

/// Default wait for asynchronous backend transitions
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_TIMEOUT,
            update: DEFAULT_TIMEOUT,
            delete: DEFAULT_TIMEOUT,
        }
    }
}

impl Timeouts {
    /// Apply the overrides found in the `timeouts` attribute
    pub fn with_overrides(self, attrs: Attrs<'_>) -> ProviderResult<Self> {
        let Some(block) = attrs.block("timeouts")? else {
            return Ok(self);
        };

        let mut resolved = self;
        for (op, slot) in [
            ("create", &mut resolved.create),
            ("update", &mut resolved.update),
            ("delete", &mut resolved.delete),
        ] {
            if let Some(raw) = block.non_empty_string(op)? {
                *slot = parse_duration(&raw).map_err(|e| {
                    ProviderError::validation(&["timeouts"], format!("timeouts.{op}: {e}"))
                })?;
            }
        }
        Ok(resolved)
    }
}

/// Parse a duration like "30s", "5m", "1h30m" or "250ms"
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = raw;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in duration '{raw}'"))?;
        if digits == 0 {
            return Err(format!("invalid duration '{raw}'"));
        }
        let amount: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid number in duration '{raw}'"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        total += match unit {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount * 60),
            "h" => Duration::from_secs(amount * 3600),
            other => return Err(format!("unknown unit '{other}' in duration '{raw}'")),
        };
    }
    Ok(total)
}
