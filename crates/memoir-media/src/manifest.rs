//! Concat demuxer input lists.

use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};

/// Ordered list of files fed to FFmpeg's concat demuxer.
///
/// Entry order is output order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConcatManifest {
    entries: Vec<PathBuf>,
}

impl ConcatManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            entries: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.entries.push(path.into());
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the list in concat demuxer syntax.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str("file '");
            out.push_str(&escape_entry(entry));
            out.push_str("'\n");
        }
        out
    }

    /// Write the rendered list to `path`.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> MediaResult<()> {
        if self.entries.is_empty() {
            return Err(MediaError::invalid_input("concat manifest has no entries"));
        }
        tokio::fs::write(path.as_ref(), self.render()).await?;
        Ok(())
    }
}

/// Quote a path for a single-quoted concat entry: `'` becomes `'\''`.
fn escape_entry(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}
