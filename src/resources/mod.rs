//! Request builders for each Gmail resource
//!
//! These only construct [`ApiRequest`](crate::transport::ApiRequest) values;
//! sending them and mapping errors happens in the service layer.

pub mod labels;
pub mod messages;
pub mod oauth;

pub use messages::{ListParams, MessageFormat};

/// Percent-encode an id for use as a single path segment, so `/`, `?`
/// and `#` inside it cannot change the request target.
pub(crate) fn path_segment(id: &str) -> String {
    url::form_urlencoded::byte_serialize(id.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
