use url::Url;

/// Returns the network location of a URL: host plus explicit non-default port.
///
/// This is the key used for resolver dispatch and per-domain rate limiting,
/// so `imgur.com` and `i.imgur.com` are distinct domains.
///
/// # Examples
///
/// ```
/// use quickpeek::util::domain_of;
/// use url::Url;
///
/// let url = Url::parse("https://imgur.com/a/xyz").unwrap();
/// assert_eq!(domain_of(&url).as_deref(), Some("imgur.com"));
///
/// let url = Url::parse("http://127.0.0.1:8080/r/pics").unwrap();
/// assert_eq!(domain_of(&url).as_deref(), Some("127.0.0.1:8080"));
/// ```
pub fn domain_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    })
}

/// Like [`domain_of`] but for an unparsed URL string.
pub fn domain_of_str(url: &str) -> Option<String> {
    Url::parse(url).ok().as_ref().and_then(domain_of)
}

/// Returns the file extension of the last path segment, without the dot.
///
/// Query string and fragment are ignored. A segment without a dot, or with
/// nothing after its last dot, has no extension. Relative paths are
/// accepted too.
pub fn extension_of(url: &str) -> Option<String> {
    match Url::parse(url) {
        Ok(parsed) => url_extension(&parsed).map(str::to_owned),
        Err(_) => {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            segment_extension(path.rsplit('/').next()?).map(str::to_owned)
        }
    }
}

/// [`extension_of`] for an already parsed URL.
pub fn url_extension(url: &Url) -> Option<&str> {
    segment_extension(url.path_segments()?.next_back()?)
}

fn segment_extension(segment: &str) -> Option<&str> {
    let (stem, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || stem.is_empty() {
        return None;
    }
    Some(ext)
}

/// Resolves a possibly relative `href` against the page it was found on.
///
/// Protocol-relative links (`//host/path`) inherit the base scheme.
pub fn resolve_href(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Url::parse(href).ok();
    }
    base.join(href).ok()
}
