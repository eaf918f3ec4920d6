//! Text formats used by the static tables.
//!
//! - pipe lists: `a|b|c`
//! - params: `key=value;key2=3`, or a flat JSON object `{"key": "value"}`
//! - stack lists: `id_qty|id_qty`, where the id may itself contain `_`
//!
//! Malformed entries are skipped or defaulted, never reported.

use std::collections::BTreeMap;

use crate::inventory::ItemStack;

/// Split a pipe-delimited list, trimming entries and dropping empties.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parsed `key=value;...` parameter string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// String value, empty when missing.
    pub fn text(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// Positive integer value; missing, malformed or zero falls back to `default`.
    pub fn positive_or(&self, key: &str, default: u32) -> u32 {
        match self.get(key).and_then(|v| v.parse::<u32>().ok()) {
            Some(n) if n > 0 => n,
            _ => default,
        }
    }

    /// Integer value if present and well formed.
    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parse `key=value;key2=value2`. Pairs without a key are skipped.
///
/// A string that parses as a JSON object is read as one instead; nested
/// values and nulls are dropped.
pub fn parse_params(raw: &str) -> Params {
    if let Some(params) = parse_json_params(raw) {
        return params;
    }

    let mut values = BTreeMap::new();
    for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = match part.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (part, ""),
        };
        if key.is_empty() {
            continue;
        }
        values.insert(key.to_string(), value.to_string());
    }
    Params { values }
}

fn parse_json_params(raw: &str) -> Option<Params> {
    let object: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw.trim()).ok()?;
    let values = object
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                    (Some(i), _) => i.to_string(),
                    (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => (f as i64).to_string(),
                    _ => n.to_string(),
                },
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key, text))
        })
        .collect();
    Some(Params { values })
}

/// Parse a loot output list. Each entry is split at its last underscore;
/// a missing, malformed or zero quantity becomes 1.
pub fn parse_stacks(raw: &str) -> Vec<ItemStack> {
    raw.split('|')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|entry| match entry.rsplit_once('_') {
            Some((id, qty)) => {
                let quantity = match qty.trim().parse::<i64>() {
                    Ok(q) if q != 0 => q,
                    _ => 1,
                };
                ItemStack::new(id, quantity)
            }
            None => ItemStack::new(entry, 1),
        })
        .collect()
}

/// Parse a reward list. Entries without a numeric quantity are dropped.
pub fn parse_reward_stacks(raw: &str) -> Vec<ItemStack> {
    raw.split('|')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .filter_map(|entry| {
            let (id, qty) = entry.rsplit_once('_')?;
            let quantity = qty.trim().parse::<i64>().ok()?;
            if id.is_empty() {
                return None;
            }
            Some(ItemStack::new(id, quantity))
        })
        .collect()
}

/// Inverse of [`parse_stacks`], used for logs and table round-trips.
pub fn format_stacks(stacks: &[ItemStack]) -> String {
    stacks
        .iter()
        .map(|s| format!("{}_{}", s.item_id, s.quantity))
        .collect::<Vec<_>>()
        .join("|")
}
