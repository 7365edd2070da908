//! Parser configuration.

use encoding_rs::{Encoding, WINDOWS_1252};

use crate::charset;

/// Default maximum multipart nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Options controlling envelope parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    /// Deepest part nesting that may still descend into children.
    pub max_depth: usize,
    /// Inputs larger than this are rejected before parsing.
    pub max_message_size: Option<usize>,
    /// Western charset tried after the declared charset and UTF-8 fail.
    pub fallback_charset: &'static Encoding,
    /// Synthesize plain text from HTML when no text body exists.
    pub html_to_text: bool,
    /// Look for `<meta>` charset declarations in HTML parts without one.
    pub sniff_html_charset: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_message_size: None,
            fallback_charset: WINDOWS_1252,
            html_to_text: true,
            sniff_html_charset: true,
        }
    }
}

impl ParserOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an options builder.
    #[must_use]
    pub fn builder() -> ParserOptionsBuilder {
        ParserOptionsBuilder::new()
    }
}

/// Builder for [`ParserOptions`].
#[derive(Debug, Clone, Default)]
pub struct ParserOptionsBuilder {
    options: ParserOptions,
}

impl ParserOptionsBuilder {
    /// Creates a builder with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth.
    #[must_use]
    pub const fn max_depth(mut self, depth: usize) -> Self {
        self.options.max_depth = depth;
        self
    }

    /// Sets the maximum accepted input size in bytes.
    #[must_use]
    pub const fn max_message_size(mut self, size: usize) -> Self {
        self.options.max_message_size = Some(size);
        self
    }

    /// Sets the fallback charset by label. Unknown labels keep the current value.
    #[must_use]
    pub fn fallback_charset(mut self, label: &str) -> Self {
        if let Some(encoding) = charset::lookup(label) {
            self.options.fallback_charset = encoding;
        } else {
            tracing::warn!(label, "unknown fallback charset, keeping {}", self.options.fallback_charset.name());
        }
        self
    }

    /// Enables or disables plain text synthesis from HTML.
    #[must_use]
    pub const fn html_to_text(mut self, enabled: bool) -> Self {
        self.options.html_to_text = enabled;
        self
    }

    /// Enables or disables HTML `<meta>` charset sniffing.
    #[must_use]
    pub const fn sniff_html_charset(mut self, enabled: bool) -> Self {
        self.options.sniff_html_charset = enabled;
        self
    }

    /// Builds the options.
    #[must_use]
    pub fn build(self) -> ParserOptions {
        self.options
    }
}
