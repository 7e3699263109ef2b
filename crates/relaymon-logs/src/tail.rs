use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Poll-driven tailer for a log file subject to append, truncation, and
/// rotation.
///
/// The tailer keeps a byte offset into the file and only ever reads what
/// was appended since the last poll. The file is reopened by path on every
/// poll, so a rotated file (new inode at the same path) is picked up
/// without holding a stale handle.
pub struct FileTailer {
    path: PathBuf,

    /// Byte offset of the last read position.
    offset: u64,

    /// Inode the offset refers to, for rotation detection.
    #[cfg(unix)]
    inode: Option<u64>,

    /// Trailing bytes of an incomplete line, prefixed to the next read.
    partial: Vec<u8>,
}

impl FileTailer {
    /// Create a tailer positioned at the start of the file. Existing
    /// content is delivered on the first poll.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            #[cfg(unix)]
            inode: None,
            partial: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read any newly appended complete lines.
    ///
    /// Truncation (file shrank below the last offset) and rotation (new
    /// inode at the same path) both restart reading from the top of the
    /// file. A missing file is not an error; it yields no lines until the
    /// file appears.
    pub async fn poll(&mut self) -> std::io::Result<Vec<String>> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;

            let inode = metadata.ino();
            if self.inode.is_some_and(|previous| previous != inode) {
                // Rotated: a new file took over the path. A buffered
                // partial line belonged to the old file and can never
                // complete.
                self.offset = 0;
                self.partial.clear();
            }
            self.inode = Some(inode);
        }

        if metadata.len() < self.offset {
            // Truncated: resume from the start.
            self.offset = 0;
            self.partial.clear();
        }

        if metadata.len() == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut chunk = Vec::new();
        let read = file.read_to_end(&mut chunk).await?;
        self.offset += read as u64;

        self.partial.extend_from_slice(&chunk);
        Ok(self.drain_complete_lines())
    }

    /// Split off every complete line in the buffer, keeping trailing
    /// partial bytes for the next poll. Lines are recovered with lossy
    /// UTF-8 conversion; the log stream is not trusted to be well-formed.
    fn drain_complete_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.partial.drain(..=last_newline).collect();
        complete
            .split(|&b| b == b'\n')
            .map(|raw| {
                String::from_utf8_lossy(raw)
                    .trim_end_matches('\r')
                    .to_string()
            })
            .filter(|line| !line.is_empty())
            .collect()
    }
}
