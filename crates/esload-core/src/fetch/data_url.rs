//! `data:` URL decoding.

use crate::error::{codes, LoaderError, Result};
use bytes::Bytes;
use url::Url;

/// A decoded `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// The MIME type essence (`type/subtype`), lowercased. Defaults to
    /// `text/plain`.
    pub mime_type: String,
    pub body: Bytes,
}

impl DataUrl {
    /// Decode a `data:` URL.
    ///
    /// # Errors
    /// Returns `DATA_URL_INVALID` when the URL has no `,` separator or its
    /// base64 payload does not decode.
    pub fn decode(url: &Url) -> Result<Self> {
        let invalid = |why: String| {
            LoaderError::new(
                codes::DATA_URL_INVALID,
                format!("Invalid data URL {}: {why}", truncate(url.as_str())),
            )
        };

        let parsed =
            ::data_url::DataUrl::process(url.as_str()).map_err(|e| invalid(format!("{e:?}")))?;
        let (body, _) = parsed
            .decode_to_vec()
            .map_err(|e| invalid(format!("{e:?}")))?;

        Ok(Self {
            mime_type: essence(parsed.mime_type()),
            body: Bytes::from(body),
        })
    }
}

/// MIME essence of a `data:` URL without decoding its payload.
pub(crate) fn mime_type_of(url: &Url) -> Option<String> {
    let parsed = ::data_url::DataUrl::process(url.as_str()).ok()?;
    Some(essence(parsed.mime_type()))
}

fn essence(mime: &::data_url::mime::Mime) -> String {
    format!("{}/{}", mime.type_, mime.subtype)
}

fn truncate(s: &str) -> &str {
    const MAX: usize = 64;
    if s.len() <= MAX {
        return s;
    }
    let mut end = MAX;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
