//! Outgoing message composition
//!
//! Builds an RFC 822 envelope and encodes it base64url without padding, the
//! form the `messages.send` endpoint expects in its `raw` field.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::{GmailError, Result};
use crate::models::{Contact, is_valid_email};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailDraft {
    pub to: Vec<Contact>,
    pub subject: String,
    pub body: String,
    pub from: Option<Contact>,
    pub cc: Vec<Contact>,
    pub bcc: Vec<Contact>,
    /// Send as `text/html` instead of `text/plain`
    pub html: bool,
    /// Reply within an existing thread
    pub thread_id: Option<String>,
}

impl EmailDraft {
    /// Draft addressed to a comma-separated recipient list
    pub fn new(to: &str, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: Contact::parse_list(to),
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_cc(mut self, cc: &str) -> Self {
        self.cc = Contact::parse_list(cc);
        self
    }

    pub fn with_bcc(mut self, bcc: &str) -> Self {
        self.bcc = Contact::parse_list(bcc);
        self
    }

    pub fn with_from(mut self, from: &str) -> Self {
        self.from = Contact::parse(from);
        self
    }

    pub fn html(mut self) -> Self {
        self.html = true;
        self
    }

    /// Syntactic recipient and header check, done before anything touches the network
    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(GmailError::validation("to", "At least one recipient is required"));
        }

        if has_line_break(&self.subject) {
            return Err(GmailError::validation(
                "subject",
                "Subject must not contain line breaks",
            ));
        }

        for (field, contacts) in [
            ("to", self.to.as_slice()),
            ("cc", self.cc.as_slice()),
            ("bcc", self.bcc.as_slice()),
            ("from", self.from.as_slice()),
        ] {
            for contact in contacts {
                check_contact(field, contact)?;
            }
        }
        Ok(())
    }

    /// The RFC 822 message text, CRLF line endings
    pub fn to_rfc822(&self) -> String {
        let mut lines = Vec::new();

        if let Some(from) = &self.from {
            lines.push(format!("From: {}", from.format()));
        }
        lines.push(format!("To: {}", join(&self.to)));
        if !self.cc.is_empty() {
            lines.push(format!("Cc: {}", join(&self.cc)));
        }
        if !self.bcc.is_empty() {
            lines.push(format!("Bcc: {}", join(&self.bcc)));
        }
        lines.push(format!("Subject: {}", self.subject));
        lines.push("MIME-Version: 1.0".to_string());
        lines.push(format!(
            "Content-Type: {}; charset=utf-8",
            if self.html { "text/html" } else { "text/plain" }
        ));

        format!("{}\r\n\r\n{}", lines.join("\r\n"), self.body)
    }

    /// Validate, then encode the envelope for the `raw` field
    pub fn encode(&self) -> Result<String> {
        self.validate()?;
        Ok(URL_SAFE_NO_PAD.encode(self.to_rfc822()))
    }
}

/// Header values are single-line; a bare CR or LF would start a new header
fn has_line_break(value: &str) -> bool {
    value.contains(['\r', '\n'])
}

fn check_contact(field: &str, contact: &Contact) -> Result<()> {
    if !contact.is_valid() {
        return Err(GmailError::validation(
            field,
            format!("Invalid email address: {}", contact.email),
        ));
    }
    if contact.name.as_deref().is_some_and(has_line_break) {
        return Err(GmailError::validation(
            field,
            format!("Display name for {} must not contain line breaks", contact.email),
        ));
    }
    Ok(())
}

fn join(contacts: &[Contact]) -> String {
    contacts
        .iter()
        .map(Contact::format)
        .collect::<Vec<_>>()
        .join(", ")
}
