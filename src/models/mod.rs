//! Entities parsed from Gmail API responses

pub mod contact;
pub mod email;
pub mod label;
pub mod token;

pub use contact::{is_valid_email, Contact};
pub use email::Email;
pub use label::{Label, LabelColor, LabelDraft, LabelType, MessageVisibility, Visibility};
pub use token::Token;
