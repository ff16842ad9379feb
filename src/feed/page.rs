//! Channel identity extraction from a channel's web page.
//!
//! The page carries the channel id and display name in `<meta itemprop=...>`
//! tags and advertises its item feed with a `<link rel="alternate">` tag.
//! Scanning is plain string work over the tag text; no HTML parser is needed
//! for these three markers.

use thiserror::Error;

use crate::util::strip_control_chars;

/// Identity fields scraped from a channel page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    pub id: String,
    pub name: String,
    pub feed_url: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// A required marker was not found in the page
    #[error("channel page has no {0}; subscribe with the channel id instead")]
    MissingMarker(&'static str),
}

/// Extracts the channel id, name and feed address from a channel page.
///
/// When a marker appears more than once, the last occurrence wins. Relative
/// feed addresses resolve against `page_url`.
pub fn extract_channel_identity(
    html: &str,
    page_url: &str,
) -> Result<ChannelIdentity, IdentityError> {
    let mut id = None;
    let mut name = None;
    let mut feed_href = None;

    for tag in tags(html, "meta") {
        let attrs = parse_attrs(tag);
        let (Some(itemprop), Some(content)) = (attr(&attrs, "itemprop"), attr(&attrs, "content"))
        else {
            continue;
        };
        let props: Vec<&str> = itemprop.split_whitespace().collect();
        if props.contains(&"channelId") {
            id = Some(content.to_string());
        }
        if props.contains(&"name") {
            name = Some(content.to_string());
        }
    }

    for tag in tags(html, "link") {
        let attrs = parse_attrs(tag);
        let is_alternate = attr(&attrs, "rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("alternate")));
        let is_rss = attr(&attrs, "type").is_some_and(|t| t.contains("application/rss+xml"));
        let is_titled_rss = attr(&attrs, "title").is_some_and(|t| t.contains("RSS"));
        if is_alternate && is_rss && is_titled_rss {
            if let Some(href) = attr(&attrs, "href") {
                feed_href = Some(href.to_string());
            }
        }
    }

    let id = id
        .map(|v| decode_entities(&v).trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(IdentityError::MissingMarker("channel id marker"))?;
    let name = name
        .map(|v| strip_control_chars(&decode_entities(&v)).trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(IdentityError::MissingMarker("channel name marker"))?;
    let feed_href = feed_href.ok_or(IdentityError::MissingMarker("RSS feed link"))?;

    Ok(ChannelIdentity {
        id,
        name,
        feed_url: resolve_url(&decode_entities(&feed_href), page_url),
    })
}

/// Yields the attribute text of every `<name ...>` tag, case-insensitively.
fn tags<'a>(html: &'a str, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    let open = format!("<{name}");
    let mut search_from = 0;

    std::iter::from_fn(move || loop {
        let rest = html.get(search_from..)?;
        let start = find_ascii_ci(rest, &open)?;
        let abs_start = search_from + start + open.len();
        let end = html[abs_start..].find('>')?;
        search_from = abs_start + end + 1;

        // Reject longer tag names sharing the prefix, e.g. <metadata>
        let body = &html[abs_start..abs_start + end];
        match body.chars().next() {
            Some(c) if c.is_ascii_whitespace() || c == '/' => return Some(body),
            _ => continue,
        }
    })
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

/// Parses `key="value" key='value' key=value flag` into lowercase keys and raw values.
fn parse_attrs(tag: &str) -> Vec<(String, &str)> {
    let mut attrs = Vec::new();
    let bytes = tag.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let key_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' {
            i += 1;
        }
        if key_start == i {
            break;
        }
        let key = tag[key_start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            attrs.push((key, ""));
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = match bytes.get(i) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let value_start = i + 1;
                let len = tag[value_start..]
                    .find(quote as char)
                    .unwrap_or(tag.len() - value_start);
                i = value_start + len + 1;
                &tag[value_start..value_start + len]
            }
            _ => {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                &tag[value_start..i]
            }
        };
        attrs.push((key, value));
    }

    attrs
}

fn attr<'a>(attrs: &'a [(String, &'a str)], name: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == name).map(|(_, v)| *v)
}

/// Decodes the handful of entities that show up in attribute values.
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn resolve_url(href: &str, base_url: &str) -> String {
    match url::Url::parse(base_url).and_then(|base| base.join(href)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => href.to_owned(),
    }
}
