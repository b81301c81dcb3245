//! Extraction of structured data from generated text.
//!
//! Strategies run in order: the whole text, fenced code blocks, then every
//! balanced JSON object found by a string-aware brace scanner. The first
//! candidate that deserializes into the requested type wins.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("generated text was empty")]
    Empty,

    #[error("no JSON object found in generated text: {excerpt}")]
    NoJson { excerpt: String },

    #[error("JSON did not match the expected shape: {reason}")]
    NonConforming { reason: String },
}

pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut last_error = None;
    let mut saw_json = false;
    for candidate in candidates(trimmed) {
        let value: Value = match serde_json::from_str(candidate) {
            Ok(v) => v,
            Err(_) => continue,
        };
        saw_json = true;
        match serde_json::from_value::<T>(value) {
            Ok(parsed) => return Ok(parsed),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    match last_error {
        Some(reason) if saw_json => Err(ParseError::NonConforming { reason }),
        _ => Err(ParseError::NoJson {
            excerpt: trimmed.chars().take(80).collect(),
        }),
    }
}

fn candidates(text: &str) -> impl Iterator<Item = &str> {
    std::iter::once(text)
        .chain(fenced_blocks(text))
        .chain(BalancedObjects::new(text))
}

fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        // Skip an info string such as `json`.
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        match body.find("```") {
            Some(end) => {
                blocks.push(body[..end].trim());
                rest = &body[end + 3..];
            }
            None => {
                blocks.push(body.trim());
                break;
            }
        }
    }
    blocks
}

/// Iterator over top-level balanced `{...}` spans. Braces inside JSON
/// strings (including escaped quotes) do not count toward depth.
struct BalancedObjects<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> BalancedObjects<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for BalancedObjects<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while self.pos < self.text.len() {
            let offset = self.text[self.pos..].find('{')?;
            let start = self.pos + offset;
            match balanced_end(&self.text[start..]) {
                Some(len) => {
                    self.pos = start + len;
                    return Some(&self.text[start..start + len]);
                }
                None => self.pos = start + 1,
            }
        }
        None
    }
}

/// Byte length of the balanced object starting at `s[0] == '{'`.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fallback scan for `key: value` / `"key": "value"` pairs in text that
/// is not valid JSON. Returns the value of the first key that appears.
pub fn scan_labelled(text: &str, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let pattern = format!(
            r#"(?i)"?\b{}\b"?\s*[:=]\s*(?:"([^"\n]*)"|\[([^\]\n]*)\]|([^,}}\n]+))"#,
            regex::escape(key)
        );
        let re = Regex::new(&pattern).ok()?;
        let caps = re.captures(text)?;
        let value = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))?
            .as_str()
            .trim()
            .trim_matches('"')
            .to_string();
        (!value.is_empty()).then_some(value)
    })
}

pub fn scan_confidence(text: &str) -> Option<f32> {
    scan_labelled(text, &["confidence", "score"])?.parse().ok()
}
