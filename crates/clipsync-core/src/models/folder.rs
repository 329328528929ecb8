use std::fmt::{Display, Formatter, Result as FmtResult};

/// Hierarchical remote folder path, e.g. `Frigate/2023/11/15`
///
/// Segments never contain `/` and are never empty; the base folder is split
/// on `/` so a nested `UPLOAD_DIR` becomes several segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderPath {
    segments: Vec<String>,
}

impl FolderPath {
    pub fn new(base: &str) -> Self {
        let segments = base
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Self { segments }
    }

    /// Append one segment; slashes inside it are split into further segments.
    pub fn join(mut self, segment: impl AsRef<str>) -> Self {
        self.segments.extend(
            segment
                .as_ref()
                .split('/')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        );
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Every cumulative prefix, root first: `a`, `a/b`, `a/b/c`
    pub fn prefixes(&self) -> impl Iterator<Item = FolderPath> + '_ {
        (1..=self.segments.len()).map(move |len| FolderPath {
            segments: self.segments[..len].to_vec(),
        })
    }
}

impl Display for FolderPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.segments.join("/"))
    }
}
