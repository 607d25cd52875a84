//! Now-playing metadata normalization.
//!
//! Two transports carry the same information in different shapes:
//!
//! - the native pipeline delivers structured tag lists (`title`, `homepage`)
//! - the external decoder prints free-text `ICY Info:` status lines
//!
//! Both are reduced to a [`NowPlaying`] value here. Everything in this
//! module is pure and allocation-light; nothing touches the network.

use std::collections::BTreeMap;

/// Separator between artist and song in an ICY stream title.
pub const TITLE_SEPARATOR: &str = " - ";

/// Prefix of the decoder's metadata status line.
pub const ICY_INFO_PREFIX: &str = "ICY Info: ";

/// Marker that must follow the prefix for a line to count as metadata.
const ICY_INFO_MARKER: &str = "ICY Info: StreamTitle=";

/// Tag names the native pipeline uses.
pub const TAG_TITLE: &str = "title";
pub const TAG_HOMEPAGE: &str = "homepage";

/// Tag list carried by one pipeline tag message.
pub type TagList = BTreeMap<String, String>;

/// Normalized now-playing update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NowPlaying {
    pub artist: String,
    pub song: String,
    pub cover_url: Option<String>,
}

impl NowPlaying {
    pub fn new(artist: impl Into<String>, song: impl Into<String>, cover_url: Option<String>) -> Self {
        Self {
            artist: artist.into(),
            song: song.into(),
            cover_url,
        }
    }

    /// `Artist - Song`, the form printed on the console.
    pub fn display_line(&self) -> String {
        format!("{}{}{}", self.artist, TITLE_SEPARATOR, self.song)
    }
}

/// Split `Artist - Song` on the first separator.
///
/// Returns `None` when the separator is missing; callers treat that as
/// "no update" rather than guessing which half is the artist.
pub fn split_title(title: &str) -> Option<(String, String)> {
    title
        .split_once(TITLE_SEPARATOR)
        .map(|(artist, song)| (artist.to_string(), song.to_string()))
}

/// Fields scraped from one `ICY Info:` line.
///
/// Missing fields are empty strings, not absent: a recognized line always
/// yields the full triple. A title without the separator is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IcyInfo {
    pub artist: String,
    pub song: String,
    pub stream_url: String,
}

impl IcyInfo {
    /// Convert to the normalized event. An empty `StreamUrl` means no cover.
    pub fn into_now_playing(self) -> NowPlaying {
        let cover_url = Some(self.stream_url).filter(|url| !url.is_empty());
        NowPlaying {
            artist: self.artist,
            song: self.song,
            cover_url,
        }
    }
}

/// Strip one layer of surrounding single quotes.
fn unquote(value: &str) -> &str {
    let value = value.strip_prefix('\'').unwrap_or(value);
    value.strip_suffix('\'').unwrap_or(value)
}

/// Split an ICY metadata block into `Key=Value` pairs.
///
/// Tokens are `;`-separated. Tokens shorter than two characters and tokens
/// without `=` are dropped. Values keep their quotes; see [`unquote`].
/// Trailing NUL padding (as found in raw stream metadata blocks) is ignored.
pub fn icy_fields(block: &str) -> impl Iterator<Item = (&str, &str)> {
    block
        .trim_end_matches('\0')
        .trim_end()
        .split(';')
        .filter(|token| token.len() >= 2)
        .filter_map(|token| token.split_once('='))
}

/// Parse one line of decoder output.
///
/// Returns `None` for anything that is not an `ICY Info: StreamTitle=` line,
/// and for a non-empty title without the separator (same as
/// [`now_playing_from_tags`]).
pub fn parse_icy_line(line: &str) -> Option<IcyInfo> {
    let start = line.find(ICY_INFO_MARKER)?;
    let fields = &line[start + ICY_INFO_PREFIX.len()..];

    let mut info = IcyInfo::default();
    for (key, value) in icy_fields(fields) {
        match key {
            "StreamTitle" => {
                let title = unquote(value);
                if !title.is_empty() {
                    (info.artist, info.song) = split_title(title)?;
                }
            }
            "StreamUrl" => info.stream_url = unquote(value).to_string(),
            _ => {}
        }
    }
    Some(info)
}

/// Map a raw ICY metadata block onto the pipeline's tag names.
///
/// `StreamTitle` becomes `title` and `StreamUrl` becomes `homepage`, the
/// same mapping the stream demuxer advertises. Empty values are skipped.
pub fn icy_block_to_tags(block: &str) -> TagList {
    let mut tags = TagList::new();
    for (key, value) in icy_fields(block) {
        let name = match key {
            "StreamTitle" => TAG_TITLE,
            "StreamUrl" => TAG_HOMEPAGE,
            _ => continue,
        };
        let value = unquote(value);
        if !value.is_empty() {
            tags.insert(name.to_string(), value.to_string());
        }
    }
    tags
}

/// Combine the tags of one pipeline message into a single update.
///
/// - no `title` and no `homepage`: no update
/// - `title` without the separator: no update for the whole message
/// - `homepage` alone: update with empty artist and song
pub fn now_playing_from_tags(tags: &TagList) -> Option<NowPlaying> {
    let mut update = None::<NowPlaying>;

    if let Some(title) = tags.get(TAG_TITLE) {
        let (artist, song) = split_title(title)?;
        update = Some(NowPlaying::new(artist, song, None));
    }

    if let Some(homepage) = tags.get(TAG_HOMEPAGE) {
        update.get_or_insert_with(NowPlaying::default).cover_url = Some(homepage.clone());
    }

    update
}
