use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Text every routing key starts with (the marker without its leading dash).
pub const KEY_PREFIX: &str = "lora ";

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)-lora\s+(\S+)").expect("failed to compile filename marker regex")
});

/// Extract the routing key from a saved file's name.
///
/// Looks for the first `-lora <token>` (case-insensitive) and returns
/// `"lora <token>"` with the token lower-cased. The file extension is not
/// part of the token. `None` means the file carries no route.
pub fn extract_key(file_name: &str) -> Option<String> {
    let stem = strip_extension(file_name);
    MARKER_RE
        .captures(stem)
        .map(|caps| format!("{}{}", KEY_PREFIX, caps[1].to_lowercase()))
}

/// Drop a trailing `.ext` when it looks like a real extension.
fn strip_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => file_name,
    }
}

/// Routing key → destination chat id table, parsed from the user's
/// `key:chat_id; key:chat_id` mapping string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMapping {
    entries: HashMap<String, String>,
}

impl ChannelMapping {
    /// Parse a mapping string.
    ///
    /// Entries are separated by `;` and split on the first `:`. Keys are
    /// trimmed and lower-cased, values trimmed. Entries without a `:` or
    /// with an empty key are skipped; later duplicates replace earlier ones.
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split(';')
            .filter_map(|entry| {
                let (key, value) = entry.split_once(':')?;
                let key = key.trim().to_lowercase();
                if key.is_empty() {
                    return None;
                }
                Some((key, value.trim().to_string()))
            })
            .collect();
        Self { entries }
    }

    /// Exact lookup of an already lower-cased key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Destination for a key, treating an empty chat id as no route.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|chat_id| !chat_id.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
