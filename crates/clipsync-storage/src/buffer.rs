//! Disk-backed spool for downloaded clips.
//!
//! A clip is written here chunk by chunk while it downloads, rewound, and then
//! handed to a backend which streams it back out. The spool file is an
//! anonymous temp file that is unlinked when the buffer (or the upload body
//! built from it) is dropped, so no code path can leak it.

use std::io::{self, SeekFrom};
use std::path::Path;

use futures::StreamExt;
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;

/// Size of the slices written to and streamed from the spool file
pub const SPOOL_CHUNK_SIZE: usize = 8192;

#[derive(Debug)]
pub struct ClipBuffer {
    file: File,
    temp: NamedTempFile,
    len: u64,
}

impl ClipBuffer {
    /// Create an empty spool file inside `dir`.
    pub fn new_in(dir: impl AsRef<Path>) -> io::Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix("clipsync-")
            .suffix(".spool")
            .tempfile_in(dir)?;
        let file = File::from_std(temp.as_file().try_clone()?);

        Ok(Self { file, temp, len: 0 })
    }

    /// Append `chunk`, in slices of at most `SPOOL_CHUNK_SIZE` bytes.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        for slice in chunk.chunks(SPOOL_CHUNK_SIZE) {
            self.file.write_all(slice).await?;
            self.len += slice.len() as u64;
        }
        Ok(())
    }

    /// Flush pending writes and move back to the first byte.
    pub async fn rewind(&mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    /// Number of bytes written so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Read the remaining content from the current position.
    pub async fn read_remaining(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.len as usize);
        self.file.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Turn the spool into a streaming request body, starting at the current
    /// position. The spool file is removed once the body is dropped.
    pub fn into_body(self) -> reqwest::Body {
        let Self { file, temp, .. } = self;
        let stream = ReaderStream::with_capacity(file, SPOOL_CHUNK_SIZE).map(move |chunk| {
            let _spool = &temp;
            chunk
        });
        reqwest::Body::wrap_stream(stream)
    }
}
