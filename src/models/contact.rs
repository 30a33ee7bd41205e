//! Email address parsing and formatting
//!
//! Accepts `"Name" <addr>`, `Name <addr>`, `<addr>` and bare `addr`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .unwrap()
});

/// Characters that force a display name to be quoted (RFC 5322 specials)
const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

/// Syntactic address check used before composing outgoing mail
pub fn is_valid_email(address: &str) -> bool {
    EMAIL_PATTERN.is_match(address)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub email: String,
}

impl Contact {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse a single address. Returns `None` for blank input.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if input.ends_with('>') {
            if let Some(open) = input.rfind('<') {
                let email = input[open + 1..input.len() - 1].trim();
                let name = unquote(input[..open].trim());
                if email.is_empty() {
                    return None;
                }
                return Some(Self {
                    name: (!name.is_empty()).then_some(name),
                    email: email.to_string(),
                });
            }
        }

        Some(Self::new(input))
    }

    /// Parse a comma-separated address list without splitting inside
    /// quoted names or angle brackets
    pub fn parse_list(input: &str) -> Vec<Self> {
        let mut entries = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut escaped = false;
        let mut angle_depth = 0usize;

        for c in input.chars() {
            if escaped {
                escaped = false;
                current.push(c);
                continue;
            }
            match c {
                '\\' if in_quotes => escaped = true,
                '"' => in_quotes = !in_quotes,
                '<' if !in_quotes => angle_depth += 1,
                '>' if !in_quotes => angle_depth = angle_depth.saturating_sub(1),
                ',' if !in_quotes && angle_depth == 0 => {
                    entries.push(std::mem::take(&mut current));
                    continue;
                }
                _ => {}
            }
            current.push(c);
        }
        entries.push(current);

        entries.iter().filter_map(|entry| Self::parse(entry)).collect()
    }

    pub fn is_valid(&self) -> bool {
        is_valid_email(&self.email)
    }

    /// Render as a header value, quoting the name when it holds specials
    pub fn format(&self) -> String {
        match self.name.as_deref() {
            None => self.email.clone(),
            Some(name) if name.contains(SPECIALS) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\" <{}>", escaped, self.email)
            }
            Some(name) => format!("{} <{}>", name, self.email),
        }
    }

    /// Domain part of the address, lower-cased
    pub fn domain(&self) -> Option<String> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_lowercase())
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

/// Strip surrounding quotes and undo backslash escapes
fn unquote(name: &str) -> String {
    let inner = match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
        Some(inner) => inner,
        None => return name.to_string(),
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
