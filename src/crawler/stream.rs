//! Bounded, progress-reporting body copy
//!
//! The downloader reads response bodies through [`copy_with_progress`] into a
//! [`SpillBuffer`], which keeps small bodies in memory and moves large ones to
//! a temporary file.

use crate::crawler::context::Content;
use futures::io::{AsyncRead, AsyncReadExt};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Limits applied to one copy
#[derive(Debug, Clone, Copy)]
pub struct CopyLimits {
    /// Size of each read, and so the progress granularity
    pub buffer_size: usize,

    /// Bytes beyond this are left unread
    pub max_bytes: Option<u64>,

    /// Deadline for each individual read
    pub read_timeout: Option<Duration>,
}

impl Default for CopyLimits {
    fn default() -> Self {
        Self {
            buffer_size: 50 * 1024,
            max_bytes: None,
            read_timeout: None,
        }
    }
}

/// Copies `reader` into `writer` in fixed-size chunks
///
/// Each chunk writes `min(remaining quota, bytes read)` and then reports the
/// cumulative byte count to `progress`. The copy ends when the source is
/// drained or the quota is used up.
///
/// # Returns
///
/// * `Ok(u64)` - Total bytes written
/// * `Err(io::Error)` - A read failed, a read exceeded its deadline
///   (`ErrorKind::TimedOut`), or a write failed
pub async fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    limits: &CopyLimits,
    progress: &(dyn Fn(u64) + Send + Sync),
) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; limits.buffer_size.max(1)];
    let mut total: u64 = 0;

    loop {
        let remaining = limits.max_bytes.map(|max| max.saturating_sub(total));
        if remaining == Some(0) {
            break;
        }

        let read = match limits.read_timeout {
            Some(deadline) => tokio::time::timeout(deadline, reader.read(&mut buffer))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))??,
            None => reader.read(&mut buffer).await?,
        };
        if read == 0 {
            break;
        }

        let to_write = match remaining {
            Some(quota) => quota.min(read as u64) as usize,
            None => read,
        };
        writer.write_all(&buffer[..to_write])?;
        total += to_write as u64;
        progress(total);

        if to_write < read {
            break;
        }
    }

    writer.flush()?;
    Ok(total)
}

/// Write sink that moves to a temporary file past a size threshold
pub struct SpillBuffer {
    threshold: usize,
    memory: Vec<u8>,
    file: Option<NamedTempFile>,
}

impl SpillBuffer {
    /// Creates a buffer that spills once more than `threshold` bytes are written
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            memory: Vec::new(),
            file: None,
        }
    }

    pub fn is_spilled(&self) -> bool {
        self.file.is_some()
    }

    /// Finishes writing and hands the body over as page content
    pub fn into_content(self) -> io::Result<Content> {
        match self.file {
            Some(mut file) => {
                file.flush()?;
                Ok(Content::File(Arc::new(file)))
            }
            None => Ok(Content::from(self.memory)),
        }
    }
}

impl Write for SpillBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.file.is_none() && self.memory.len() + buf.len() > self.threshold {
            let mut file = NamedTempFile::new()?;
            file.write_all(&self.memory)?;
            self.memory = Vec::new();
            self.file = Some(file);
        }

        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => {
                self.memory.extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}
