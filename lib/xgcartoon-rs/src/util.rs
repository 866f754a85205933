use url::Url;

/// Make a possibly-relative link absolute against a base url.
pub(crate) fn make_absolute(base: &Url, href: &str) -> Option<Url> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Url::parse(href).ok();
    }

    if let Some(rest) = href.strip_prefix("//") {
        return Url::parse(&format!("{}://{rest}", base.scheme())).ok();
    }

    base.join(href).ok()
}

/// Resolve a `Location` header value against the url that produced it.
pub(crate) fn resolve_location(base: &Url, location: &str) -> Result<Url, crate::Error> {
    make_absolute(base, location).ok_or(crate::Error::MissingLocation)
}

/// Decode the five standard HTML entities.
///
/// `&amp;` is handled last so an already-decoded `&` is never re-expanded.
pub fn decode_entities(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Normalize an image link to an absolute, entity-decoded url string.
///
/// Protocol-relative and root-relative forms resolve against the image host.
pub(crate) fn normalize_image_url(src: &str) -> String {
    let src = src.trim();
    let absolute = if src.starts_with("http://") || src.starts_with("https://") {
        src.to_string()
    } else if src.starts_with("//") {
        format!("https:{src}")
    } else if src.starts_with('/') {
        match crate::IMAGE_BASE_URL.join(src) {
            Ok(url) => url.into(),
            Err(_) => src.to_string(),
        }
    } else {
        src.to_string()
    };

    decode_entities(&absolute)
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub(crate) fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
