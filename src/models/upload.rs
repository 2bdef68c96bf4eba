//! An uploaded file spooled to local disk at the HTTP boundary.
//!
//! Multipart parts arrive as a byte stream whose length is unknown up front.
//! They are written to a temp file first so the validator can look at the
//! real size before anything touches the object store. The temp file is
//! removed when the `UploadedFile` is dropped.

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{io, path::Path};
use tempfile::TempPath;
use tokio::{fs::File, io::AsyncWriteExt};

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug)]
pub struct UploadedFile {
    /// Original file name as sent by the client.
    pub name: String,

    /// Declared (or inferred) MIME type.
    pub mime_type: String,

    /// Number of bytes received, including any that were not kept on disk.
    pub size_bytes: u64,

    path: TempPath,
}

impl UploadedFile {
    /// Drain `stream` into a fresh temp file under `dir`.
    ///
    /// At most `keep_at_most` bytes are written; anything past that is still
    /// counted into `size_bytes` so an oversize upload can be reported as such.
    pub async fn spool<S>(
        dir: &Path,
        name: impl Into<String>,
        mime_type: Option<String>,
        stream: S,
        keep_at_most: u64,
    ) -> io::Result<Self>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let name = name.into();
        let (std_file, path) = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(dir)?
            .into_parts();
        let mut file = File::from_std(std_file);

        let mut size_bytes: u64 = 0;
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let kept = keep_at_most.saturating_sub(size_bytes);
            let take = (chunk.len() as u64).min(kept) as usize;
            if take > 0 {
                file.write_all(&chunk[..take]).await?;
            }
            size_bytes += chunk.len() as u64;
        }
        file.flush().await?;

        let mime_type = mime_type
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| guess_mime_type(&name).to_string());

        Ok(Self {
            name,
            mime_type,
            size_bytes,
            path,
        })
    }

    /// Location of the spooled bytes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the spooled bytes for reading.
    pub async fn open(&self) -> io::Result<File> {
        File::open(self.path()).await
    }
}

pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Fallback MIME type for clients that do not label their parts.
pub fn guess_mime_type(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => DEFAULT_MIME_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn spool_writes_all_bytes_and_cleans_up_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let file = UploadedFile::spool(
            dir.path(),
            "cat.PNG",
            None,
            chunks(&["abc", "defg"]),
            1024,
        )
        .await
        .unwrap();

        assert_eq!(file.size_bytes, 7);
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(extension_of(&file.name).as_deref(), Some("png"));
        assert_eq!(tokio::fs::read(file.path()).await.unwrap(), b"abcdefg");

        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn spool_counts_past_the_ceiling_without_keeping() {
        let dir = tempfile::tempdir().unwrap();
        let file = UploadedFile::spool(
            dir.path(),
            "big.jpg",
            Some("image/jpeg".into()),
            chunks(&["0123", "4567", "89"]),
            5,
        )
        .await
        .unwrap();

        assert_eq!(file.size_bytes, 10);
        assert_eq!(tokio::fs::read(file.path()).await.unwrap(), b"01234");
    }

    #[tokio::test]
    async fn spool_propagates_stream_errors() {
        let dir = tempfile::tempdir().unwrap();
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(io::Error::other("connection reset")),
        ]);
        let err = UploadedFile::spool(dir.path(), "a.png", None, failing, 1024)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn extension_handles_edge_cases() {
        assert_eq!(extension_of("archive.tar.GZ").as_deref(), Some("gz"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of(".png"), None);
        assert_eq!(extension_of("trailing."), None);
    }
}
