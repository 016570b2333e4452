use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ContentError;

pub const MAX_TITLE_CHARS: usize = 100;

/// Display content as submitted by a buyer, before validation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContentInput {
    pub image_ref: String,
    pub link: String,
    #[serde(default)]
    pub title: String,
}

/// Validated display content attached to a draft or allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotContent {
    pub image_ref: String,
    pub link: String,
    pub title: String,
}

impl SlotContent {
    pub fn validate(input: &ContentInput, max_title_chars: usize) -> Result<Self, ContentError> {
        let image_ref = input.image_ref.trim();
        if image_ref.is_empty() {
            return Err(ContentError::MissingImage);
        }
        let link = normalize_link(&input.link)?;
        let title = input.title.trim();
        let len = title.chars().count();
        if len > max_title_chars {
            return Err(ContentError::TitleTooLong {
                len,
                max: max_title_chars,
            });
        }
        Ok(Self {
            image_ref: image_ref.to_string(),
            link,
            title: title.to_string(),
        })
    }
}

/// Bare domains get an `https://` prefix; the result must parse as an absolute http(s) URL with a host.
pub fn normalize_link(raw: &str) -> Result<String, ContentError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ContentError::MissingLink);
    }
    let candidate = if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let invalid = || ContentError::InvalidLink {
        link: trimmed.to_string(),
    };
    let url = Url::parse(&candidate).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(invalid()),
    }
    Ok(url.to_string())
}

fn has_http_scheme(value: &str) -> bool {
    let lower = value.get(..8).unwrap_or(value).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
