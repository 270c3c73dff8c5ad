//! The immutable output of the renderer.

use serde::Serialize;

use crate::config::{ConfigHasher, Fingerprint};

use super::{BASE_CONFIG_NAME, CUSTOM_PARSERS_CONFIG_NAME, UPSTREAM_CONFIG_NAME};

/// A single rendered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigFile {
    /// File name inside the config directory.
    pub name: String,
    /// File contents.
    pub content: String,
}

/// The rendered configuration: the main file plus optional companions.
///
/// Files are kept in a fixed order (main, upstream, custom parsers) so the
/// byte stream, and therefore the fingerprint, is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedConfig {
    files: Vec<ConfigFile>,
}

impl RenderedConfig {
    pub(super) fn new(main: String, upstream: Option<String>, custom_parsers: Option<String>) -> Self {
        let mut files = vec![ConfigFile {
            name: BASE_CONFIG_NAME.to_string(),
            content: main,
        }];

        if let Some(content) = upstream {
            files.push(ConfigFile {
                name: UPSTREAM_CONFIG_NAME.to_string(),
                content,
            });
        }

        if let Some(content) = custom_parsers {
            files.push(ConfigFile {
                name: CUSTOM_PARSERS_CONFIG_NAME.to_string(),
                content,
            });
        }

        Self { files }
    }

    /// Returns the main configuration text.
    #[must_use]
    pub fn main(&self) -> &str {
        // The main file is always the first entry.
        self.files.first().map_or("", |f| f.content.as_str())
    }

    /// Returns a file's contents by name.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.content.as_str())
    }

    /// Returns every rendered file in fixed order.
    #[must_use]
    pub fn files(&self) -> &[ConfigFile] {
        &self.files
    }

    /// Returns the deterministic byte stream over all files.
    ///
    /// Each file contributes `name NUL content NUL`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let capacity = self
            .files
            .iter()
            .map(|f| f.name.len() + f.content.len() + 2)
            .sum();
        let mut bytes = Vec::with_capacity(capacity);

        for file in &self.files {
            bytes.extend_from_slice(file.name.as_bytes());
            bytes.push(0);
            bytes.extend_from_slice(file.content.as_bytes());
            bytes.push(0);
        }

        bytes
    }

    /// Computes the fingerprint of this configuration.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        ConfigHasher::new().fingerprint(&self.to_bytes())
    }

    /// Computes the full digest of this configuration.
    #[must_use]
    pub fn digest(&self) -> String {
        ConfigHasher::new().digest(&self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_stream_layout() {
        let rendered = RenderedConfig::new(String::from("a\n"), Some(String::from("b\n")), None);

        assert_eq!(rendered.to_bytes(), b"fluent-bit.conf\0a\n\0upstream.conf\0b\n\0".to_vec());
    }

    #[test]
    fn test_file_placement_changes_fingerprint() {
        let as_upstream = RenderedConfig::new(String::from("x\n"), Some(String::from("y\n")), None);
        let as_parsers = RenderedConfig::new(String::from("x\n"), None, Some(String::from("y\n")));

        assert_ne!(as_upstream.fingerprint(), as_parsers.fingerprint());
    }

    #[test]
    fn test_file_lookup() {
        let rendered = RenderedConfig::new(String::from("main\n"), None, Some(String::from("p\n")));

        assert_eq!(rendered.main(), "main\n");
        assert_eq!(rendered.file(CUSTOM_PARSERS_CONFIG_NAME), Some("p\n"));
        assert_eq!(rendered.file(UPSTREAM_CONFIG_NAME), None);
        assert_eq!(rendered.files().len(), 2);
    }
}
