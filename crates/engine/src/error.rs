use ingest_providers::ProviderError;

// Error type shared by the engine. Messages never carry stream URLs or key material.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Invalid channel `{slug}`: {reason}")]
    InvalidChannel { slug: String, reason: String },

    #[error("Duplicate channel slug `{0}` in desired set")]
    DuplicateSlug(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key storage error for `{slug}`: {reason}")]
    Key { slug: String, reason: String },

    #[error("Failed to launch transcoder: {0}")]
    Launch(String),

    #[error("Channel source error: {0}")]
    Source(String),

    /// Parse failure reported by position only; the offending text is never echoed.
    #[error("{format} parse error at line {line}, column {column}: {reason}")]
    Parse {
        format: &'static str,
        line: usize,
        column: usize,
        reason: String,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IngestError {
    pub(crate) fn invalid(slug: &str, reason: impl Into<String>) -> Self {
        IngestError::InvalidChannel {
            slug: slug.to_string(),
            reason: reason.into(),
        }
    }

    /// TOML failure in `text`, located by the error span.
    pub fn toml(text: &str, e: &toml::de::Error) -> Self {
        let (line, column) = e
            .span()
            .map(|span| line_column(text, span.start))
            .unwrap_or((0, 0));
        IngestError::Parse {
            format: "TOML",
            line,
            column,
            reason: scrub_quoted(e.message()),
        }
    }

    pub fn json(e: &serde_json::Error) -> Self {
        let reason = match e.classify() {
            serde_json::error::Category::Io => "read failure",
            serde_json::error::Category::Syntax => "syntax error",
            serde_json::error::Category::Data => "unexpected value",
            serde_json::error::Category::Eof => "unexpected end of input",
        };
        IngestError::Parse {
            format: "JSON",
            line: e.line(),
            column: e.column(),
            reason: reason.to_string(),
        }
    }

    /// Errors raised before anything was spawned or written.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidChannel { .. } | IngestError::DuplicateSlug(_) | IngestError::Config(_)
        ) || matches!(self, IngestError::Provider(e) if e.is_config_error())
    }
}

/// 1-based line and column of byte `offset` in `text`.
fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    (line, before[line_start..].chars().count() + 1)
}

/// Replace quoted fragments of a deserializer message, which may be input values.
fn scrub_quoted(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(open) = rest.find(['"', '`']) {
        let quote = rest[open..].chars().next().unwrap_or('"');
        out.push_str(&rest[..=open]);
        let after = &rest[open + 1..];
        match after.find(quote) {
            Some(close) => {
                let inner = &after[..close];
                if inner.chars().all(|c| c.is_ascii_punctuation()) {
                    out.push_str(inner);
                } else {
                    out.push_str("...");
                }
                out.push(quote);
                rest = &after[close + 1..];
            }
            None => {
                out.push_str("...");
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        let text = "a = 1\nb = oops\n";
        assert_eq!(line_column(text, 0), (1, 1));
        assert_eq!(line_column(text, 10), (2, 5));
        assert_eq!(line_column(text, 100), (3, 1));
    }

    #[test]
    fn test_scrub_quoted() {
        assert_eq!(
            scrub_quoted(r#"invalid type: string "http://u:pw@host/", expected u32"#),
            r#"invalid type: string "...", expected u32"#
        );
        assert_eq!(
            scrub_quoted("unknown variant `hunter2`, expected `m3u`"),
            "unknown variant `...`, expected `...`"
        );
        assert_eq!(scrub_quoted("expected `,` or `}`"), "expected `,` or `}`");
        assert_eq!(scrub_quoted(r#"unterminated "secret"#), r#"unterminated "..."#);
    }
}
