use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::{debug, trace};

use crate::media::{IngestChannel, StreamUrl};
use crate::provider::ProviderError;

const HEADER: &str = "#EXTM3U";
const EXTINF: &str = "#EXTINF:";
const EXTGRP: &str = "#EXTGRP:";

/// Longest line read from a remote catalog; longer lines are skipped unbuffered.
pub const MAX_LINE_LEN: usize = 64 * 1024;

static ATTRIBUTE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z0-9_-]+)\s*=\s*"([^"]*)""#).unwrap());

/// Metadata collected from an `#EXTINF` line, waiting for its URL line.
#[derive(Debug, Default, Clone)]
struct PendingEntry {
    tvg_id: Option<String>,
    tvg_name: Option<String>,
    logo: Option<String>,
    group: Option<String>,
    title: Option<String>,
}

/// A complete catalog entry produced by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub id: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub category: Option<String>,
    pub url: StreamUrl,
}

impl From<PlaylistEntry> for IngestChannel {
    fn from(entry: PlaylistEntry) -> Self {
        IngestChannel {
            id: entry.id,
            name: entry.name,
            logo_url: entry.logo_url,
            category: entry.category,
            stream_url: entry.url,
        }
    }
}

/// Incremental, line oriented `#EXTM3U` parser.
///
/// Feed lines in order with [`M3uParser::push_line`]. The first non-empty line
/// must be the `#EXTM3U` header, anything else fails the whole parse. After
/// that the parser never fails: unknown directives are skipped and entries
/// with a non HTTP(S) target are dropped.
#[derive(Debug, Default)]
pub struct M3uParser {
    header_seen: bool,
    pending: Option<PendingEntry>,
    line_no: usize,
    dropped: usize,
}

impl M3uParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Accounts for a line that was too long to read. It cannot be the
    /// header, and whatever entry it belonged to is dropped.
    pub fn skip_oversized_line(&mut self) -> Result<(), ProviderError> {
        self.line_no += 1;
        if !self.header_seen {
            return Err(ProviderError::Format(format!(
                "expected {HEADER} header on line {}",
                self.line_no
            )));
        }
        self.pending = None;
        self.dropped += 1;
        debug!(line = self.line_no, "Dropping oversized playlist line");
        Ok(())
    }

    pub fn push_line(&mut self, raw: &str) -> Result<Option<PlaylistEntry>, ProviderError> {
        self.line_no += 1;
        let line = raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
        if line.is_empty() {
            return Ok(None);
        }

        if !self.header_seen {
            if line.starts_with(HEADER) {
                self.header_seen = true;
                return Ok(None);
            }
            return Err(ProviderError::Format(format!(
                "expected {HEADER} header on line {}",
                self.line_no
            )));
        }

        if let Some(payload) = line.strip_prefix(EXTINF) {
            if self.pending.is_some() {
                trace!(line = self.line_no, "EXTINF without target, replaced");
            }
            self.pending = Some(parse_extinf(payload));
            return Ok(None);
        }

        if let Some(group) = line.strip_prefix(EXTGRP) {
            if let Some(pending) = self.pending.as_mut() {
                let group = group.trim();
                if pending.group.is_none() && !group.is_empty() {
                    pending.group = Some(group.to_string());
                }
            }
            return Ok(None);
        }

        if line.starts_with('#') {
            // unrecognized directive or comment
            return Ok(None);
        }

        let pending = self.pending.take().unwrap_or_default();
        if !is_http_target(line) {
            self.dropped += 1;
            debug!(line = self.line_no, "Dropping playlist entry with non HTTP(S) target");
            return Ok(None);
        }

        Ok(Some(pending.into_entry(line)))
    }

    /// Completes the parse. A catalog without a header is a format error.
    pub fn finish(self) -> Result<(), ProviderError> {
        if !self.header_seen {
            return Err(ProviderError::Format(format!(
                "empty playlist, missing {HEADER} header"
            )));
        }
        Ok(())
    }
}

impl PendingEntry {
    fn into_entry(self, url: &str) -> PlaylistEntry {
        let id = self
            .tvg_id
            .unwrap_or_else(|| stable_id(url));
        let name = self
            .title
            .or(self.tvg_name)
            .unwrap_or_else(|| id.clone());
        PlaylistEntry {
            id,
            name,
            logo_url: self.logo,
            category: self.group,
            url: StreamUrl::new(url),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parses the part after `#EXTINF:`, e.g.
/// `-1 tvg-id="news.us" tvg-logo="http://..." group-title="News",News HD`.
fn parse_extinf(payload: &str) -> PendingEntry {
    let (attributes, title) = split_title(payload);
    let mut entry = PendingEntry {
        title: title.and_then(non_empty),
        ..Default::default()
    };

    for captures in ATTRIBUTE_REGEX.captures_iter(attributes) {
        let value = non_empty(&captures[2]);
        match captures[1].to_ascii_lowercase().as_str() {
            "tvg-id" => entry.tvg_id = value,
            "tvg-name" => entry.tvg_name = value,
            "tvg-logo" => entry.logo = value,
            "group-title" => entry.group = value,
            _ => {}
        }
    }
    entry
}

/// Splits at the first comma that is not inside a quoted attribute value.
fn split_title(payload: &str) -> (&str, Option<&str>) {
    let mut in_quotes = false;
    for (idx, c) in payload.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return (&payload[..idx], Some(&payload[idx + 1..])),
            _ => {}
        }
    }
    (payload, None)
}

fn is_http_target(line: &str) -> bool {
    line.split_once("://").is_some_and(|(scheme, rest)| {
        !rest.is_empty()
            && (scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https"))
    })
}

/// Stable id for entries without `tvg-id`, derived from the URL without exposing it.
fn stable_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

/// Parses a catalog from an async reader, line by line.
///
/// Lines are decoded lossily so a stray invalid byte only affects its entry.
pub async fn parse_playlist<R>(mut reader: R) -> Result<Vec<IngestChannel>, ProviderError>
where
    R: AsyncBufRead + Unpin,
{
    let mut parser = M3uParser::new();
    let mut channels = Vec::new();
    let mut buf = Vec::with_capacity(512);

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            break;
        }
        if read == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
            discard_rest_of_line(&mut reader, &mut buf).await?;
            parser.skip_oversized_line()?;
            continue;
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some(entry) = parser.push_line(&line)? {
            channels.push(entry.into());
        }
    }

    let dropped = parser.dropped();
    parser.finish()?;
    debug!(
        channels = channels.len(),
        dropped, "Parsed playlist catalog"
    );
    Ok(channels)
}

/// Consumes input up to and including the next newline, `MAX_LINE_LEN` bytes at a time.
async fn discard_rest_of_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        buf.clear();
        let read = (&mut *reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', buf)
            .await?;
        if read == 0 || buf.last() == Some(&b'\n') {
            return Ok(());
        }
    }
}

/// Parses an in-memory catalog.
pub fn parse_playlist_str(input: &str) -> Result<Vec<IngestChannel>, ProviderError> {
    let mut parser = M3uParser::new();
    let mut channels = Vec::new();
    for line in input.lines() {
        if let Some(entry) = parser.push_line(line)? {
            channels.push(entry.into());
        }
    }
    parser.finish()?;
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = "#EXTM3U x-tvg-url=\"http://epg.example.com/guide.xml\"\n\
#EXTINF:-1 tvg-id=\"news.us\" tvg-name=\"News\" tvg-logo=\"http://img.example.com/news.png\" group-title=\"News\",News HD\n\
http://upstream.example.com/live/news.ts\n\
#EXTVLCOPT:http-user-agent=VLC\n\
#EXTINF:-1 tvg-id=\"\" group-title=\"Sports, Live\",\n\
https://upstream.example.com/live/sports.m3u8\n\
#EXTINF:-1 tvg-id=\"radio\",Radio\n\
rtmp://upstream.example.com/live/radio\n\
#EXTINF:-1 tvg-id=\"movies\",Movies\n\
#EXTGRP:Cinema\n\
http://upstream.example.com/live/movies.ts\n";

    #[test]
    fn test_parse_catalog_in_source_order() {
        let channels = parse_playlist_str(CATALOG).unwrap();
        let ids: Vec<&str> = channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], "news.us");
        assert_eq!(ids[2], "movies");

        let news = &channels[0];
        assert_eq!(news.name, "News HD");
        assert_eq!(news.logo_url.as_deref(), Some("http://img.example.com/news.png"));
        assert_eq!(news.category.as_deref(), Some("News"));
        assert_eq!(news.stream_url.expose(), "http://upstream.example.com/live/news.ts");

        assert_eq!(channels[2].category.as_deref(), Some("Cinema"));
    }

    #[test]
    fn test_missing_name_falls_back_to_id() {
        let channels = parse_playlist_str(CATALOG).unwrap();
        let sports = &channels[1];
        assert_eq!(sports.id.len(), 16);
        assert_eq!(sports.name, sports.id);
        // comma inside a quoted attribute does not split the title
        assert_eq!(sports.category.as_deref(), Some("Sports, Live"));
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        let first = parse_playlist_str(CATALOG).unwrap();
        let second = parse_playlist_str(CATALOG).unwrap();
        assert_eq!(first[1].id, second[1].id);
    }

    #[test]
    fn test_non_http_targets_are_dropped() {
        let mut parser = M3uParser::new();
        let mut entries = Vec::new();
        for line in CATALOG.lines() {
            if let Some(entry) = parser.push_line(line).unwrap() {
                entries.push(entry);
            }
        }
        assert_eq!(parser.dropped(), 1);
        assert!(entries.iter().all(|e| e.id != "radio"));
    }

    #[test]
    fn test_missing_header_is_format_error() {
        let result = parse_playlist_str("\n\n#EXTINF:-1,News\nhttp://example.com/a.ts\n");
        assert!(matches!(result, Err(ProviderError::Format(_))));

        let result = parse_playlist_str("<html>not a playlist</html>");
        assert!(matches!(result, Err(ProviderError::Format(_))));

        assert!(matches!(parse_playlist_str(""), Err(ProviderError::Format(_))));
    }

    #[test]
    fn test_header_with_bom_and_crlf() {
        let input = "\u{feff}#EXTM3U\r\n#EXTINF:-1 tvg-id=\"a\",A\r\nhttp://example.com/a.ts\r\n";
        let channels = parse_playlist_str(input).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].stream_url.expose(), "http://example.com/a.ts");
    }

    #[test]
    fn test_attributes_come_from_preceding_extinf_only() {
        let input = "#EXTM3U\n\
#EXTINF:-1 tvg-id=\"first\",First\n\
#EXTINF:-1 tvg-id=\"second\",Second\n\
http://example.com/2.ts\n\
http://example.com/bare.ts\n";
        let channels = parse_playlist_str(input).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].id, "second");
        assert_ne!(channels[1].id, "second");
        assert_eq!(channels[1].name, channels[1].id);
    }

    #[tokio::test]
    async fn test_parse_from_async_reader() {
        let reader = tokio::io::BufReader::new(CATALOG.as_bytes());
        let channels = parse_playlist(reader).await.unwrap();
        assert_eq!(channels.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_utf8_only_affects_its_line() {
        let mut bytes = b"#EXTM3U\n#EXTINF:-1 tvg-id=\"x\",Bad \xff name\nhttp://example.com/x.ts\n".to_vec();
        bytes.extend_from_slice(b"#EXTINF:-1 tvg-id=\"y\",Good\nhttp://example.com/y.ts\n");
        let channels = parse_playlist(tokio::io::BufReader::new(bytes.as_slice()))
            .await
            .unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[1].name, "Good");
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let huge = "a".repeat(MAX_LINE_LEN * 3);
        let input = format!(
            "#EXTM3U\n#EXTINF:-1 tvg-id=\"big\",Big\nhttp://example.com/{huge}\n\
#EXTINF:-1 tvg-id=\"ok\",Ok\nhttp://example.com/ok.ts\n"
        );
        let channels = parse_playlist(tokio::io::BufReader::new(input.as_bytes()))
            .await
            .unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].id, "ok");

        let no_newlines = format!("#EXTM3U\n{huge}");
        let channels = parse_playlist(tokio::io::BufReader::new(no_newlines.as_bytes()))
            .await
            .unwrap();
        assert!(channels.is_empty());

        let result = parse_playlist(tokio::io::BufReader::new(huge.as_bytes())).await;
        assert!(matches!(result, Err(ProviderError::Format(_))));
    }
}
