use std::time::Duration;
use url::Url;

/// Normalize and validate a raw link or image reference found in a page.
///
/// Trims whitespace, rejects empty values and `data:` URIs, resolves
/// relative references against the page base, and accepts only http/https
/// results. Returns `None` for anything that should not be crawled.
pub fn sanitize_url(raw: &str, base: &Url) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }

    let resolved = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(raw).ok()?,
        Err(_) => return None,
    };

    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

/// Registrable domain (eTLD+1) of a host, per the public suffix list.
///
/// `a.b.example.co.uk` yields `example.co.uk`. Hosts that are themselves
/// public suffixes yield `None`.
pub fn registrable_domain(host: &str) -> Option<String> {
    psl::domain_str(host).map(|d| d.to_ascii_lowercase())
}

/// Whether two URLs share a registrable domain.
///
/// Parse or lookup failure on either side counts as "not same site", so
/// unresolvable candidates are treated as external.
pub fn same_site(base: &Url, candidate: &Url) -> bool {
    let base_domain = base.host_str().and_then(registrable_domain);
    let candidate_domain = candidate.host_str().and_then(registrable_domain);

    match (base_domain, candidate_domain) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Replace filesystem-hostile characters in a filename candidate.
pub fn sanitize_filename(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Derive a filename for a downloaded image from its URL.
///
/// Uses the last path segment when there is one; degenerate paths fall
/// back to a sanitized rendition of the whole URL string.
pub fn filename_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or("");

    let name = sanitize_filename(segment);
    if name.is_empty() || name == "." || name == ".." {
        url_safe_filename(url.as_str())
    } else {
        name
    }
}

/// Collapse an arbitrary URL string into a safe filename by replacing
/// every character outside `[A-Za-z0-9._-]` with a dash.
pub fn url_safe_filename(url: &str) -> String {
    url.chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect()
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
