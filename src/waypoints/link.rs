//! Cleanup of free-form website tags into attribute-safe links.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Characters escaped in path, query and fragment. Reserved URI delimiters
/// (`:/?#[]@!$&'()*+,;=`) and existing `%` escapes pass through.
const COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

const ENTITIES: [(&str, &str); 7] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&#x27;", "'"),
    ("&apos;", "'"),
    ("&amp;", "&"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaypointLink {
    pub href: String,
    pub text: String,
}

fn unescape_entities(value: &str) -> String {
    ENTITIES
        .iter()
        .fold(value.to_string(), |acc, (entity, plain)| acc.replace(entity, plain))
}

fn has_scheme(value: &str) -> bool {
    let Some(idx) = value.find("://") else {
        return false;
    };
    let scheme = &value[..idx];
    scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Host part of an authority: no userinfo, no port.
fn host_of(authority: &str) -> &str {
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    if host.starts_with('[') {
        return host.split_inclusive(']').next().unwrap_or(host);
    }
    host.split(':').next().unwrap_or(host)
}

/// Normalizes a website tag value. Returns `None` for blank input.
pub fn normalize_link(raw: &str) -> Option<WaypointLink> {
    let unescaped = unescape_entities(raw.trim());
    let value = unescaped.trim();
    if value.is_empty() {
        return None;
    }

    let absolute = if has_scheme(value) {
        value.to_string()
    } else if let Some(rest) = value.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{value}")
    };

    let (scheme, after) = absolute.split_once("://")?;
    let authority_end = after.find(['/', '?', '#']).unwrap_or(after.len());
    let (authority, rest) = after.split_at(authority_end);

    // The authority stays as written so internationalized hosts read the
    // same in the href and in the label.
    let href = format!(
        "{}://{}{}",
        scheme.to_ascii_lowercase(),
        authority,
        utf8_percent_encode(rest, COMPONENT)
    );
    let host = host_of(authority);
    let text = if host.is_empty() {
        href.clone()
    } else {
        host.to_lowercase()
    };
    Some(WaypointLink { href, text })
}
