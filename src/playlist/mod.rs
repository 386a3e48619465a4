//! M3U playlist parsing and import
//!
//! Playlists are line oriented: an `#EXTINF` line carries the channel
//! attributes and display name, and the next non-comment line carries the
//! stream URL.
//!
//! ```text
//! #EXTM3U
//! #EXTINF:-1 tvg-name="A" tvg-logo="http://x/a.png" group-title="G",Display
//! http://x/a
//! ```

pub mod import;

use std::sync::LazyLock;

use regex::Regex;

pub use import::{ImportError, ImportSummary, PlaylistImporter};

static EXTINF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#EXTINF:-?\d+\s*(.*)$").expect("valid regex"));
static TVG_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"tvg-name="([^"]*)""#).expect("valid regex"));
static TVG_LOGO_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"tvg-logo="([^"]*)""#).expect("valid regex"));
static GROUP_TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"group-title="([^"]*)""#).expect("valid regex"));

/// One channel parsed from a playlist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistEntry {
    /// `tvg-name`, or the text after the last comma when absent
    pub name: String,
    pub logo: String,
    pub group: String,
    pub stream_url: String,
}

/// Parse playlist text into channel entries
///
/// An `#EXTINF` line without a following URL line is dropped, as is any URL
/// line that has no preceding `#EXTINF`.
#[must_use]
pub fn parse(content: &str) -> Vec<PlaylistEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<PlaylistEntry> = None;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line == "#EXTM3U" {
            continue;
        }

        if line.starts_with("#EXTINF:") {
            pending = Some(parse_extinf(line));
        } else if !line.starts_with('#') {
            if let Some(mut entry) = pending.take() {
                line.clone_into(&mut entry.stream_url);
                entries.push(entry);
            }
        }
    }

    entries
}

fn parse_extinf(line: &str) -> PlaylistEntry {
    let mut entry = PlaylistEntry::default();

    let Some(attrs) = EXTINF_REGEX
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    else {
        return entry;
    };

    entry.name = capture_attr(&TVG_NAME_REGEX, attrs);
    entry.logo = capture_attr(&TVG_LOGO_REGEX, attrs);
    entry.group = capture_attr(&GROUP_TITLE_REGEX, attrs);

    if entry.name.is_empty() {
        entry.name = attrs
            .rsplit(',')
            .next()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
    }

    entry
}

fn capture_attr(re: &Regex, attrs: &str) -> String {
    re.captures(attrs)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
