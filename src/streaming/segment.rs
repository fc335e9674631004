//! Serving produced segment and playlist files.
//!
//! The encoder may still be writing a file while it is served. The file is
//! opened with a sharing mode that tolerates the writer, its length is taken
//! once at open time, and exactly that many bytes are sent. Nothing waits
//! for the file to grow; a segment that is not there yet is a 404 and the
//! client retries.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::error::{Error, Result};
use crate::streaming::content_type::content_type_for;
use crate::transcoding::{JobLease, JobRegistry};

const CHUNK_SIZE: usize = 64 * 1024;

/// Response body that holds the request's job lease until the body is done.
///
/// The lease is released when the stream ends or fails, and in any case when
/// the body is dropped (including on client disconnect).
pub struct LeasedStream<S> {
    inner: S,
    lease: Option<JobLease>,
}

impl<S> LeasedStream<S> {
    pub fn new(inner: S, lease: Option<JobLease>) -> Self {
        Self { inner, lease }
    }

    fn finish(&mut self) {
        if let Some(mut lease) = self.lease.take() {
            lease.release();
        }
    }
}

impl<S> Stream for LeasedStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let res = Pin::new(&mut self.inner).poll_next(cx);
        match &res {
            Poll::Ready(None) => self.finish(),
            Poll::Ready(Some(Err(e))) => {
                tracing::debug!(error = %e, "Segment stream failed");
                self.finish();
            }
            _ => {}
        }
        res
    }
}

/// Streams produced files and ties each response to its transcode job.
#[derive(Clone)]
pub struct SegmentStreamer {
    registry: Arc<JobRegistry>,
}

impl SegmentStreamer {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// Serve `file`, counting the request against the job writing `job_path`
    /// for as long as the body is being sent.
    ///
    /// A missing file is reported before any job is touched.
    pub async fn stream(&self, file: &Path, job_path: Option<&Path>) -> Result<Response> {
        if file.as_os_str().is_empty() || !tokio::fs::try_exists(file).await.unwrap_or(false) {
            return Err(Error::not_found("file", file.display()));
        }

        let lease = job_path.and_then(|p| self.registry.begin(p));

        let handle = match open_shared(file).await {
            Ok(handle) => handle,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found("file", file.display()));
            }
            Err(e) => return Err(e.into()),
        };
        let length = handle.metadata().await?.len();

        let reader = ReaderStream::with_capacity(handle.take(length), CHUNK_SIZE);
        let body = Body::from_stream(LeasedStream::new(reader, lease));

        tracing::debug!(path = %file.display(), length, "Streaming transcode output");

        Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE.as_str(), content_type_for(file).to_string()),
                (header::CONTENT_LENGTH.as_str(), length.to_string()),
            ],
            body,
        )
            .into_response())
    }
}

/// Open for reading while allowing the encoder to keep writing (and deleting).
async fn open_shared(path: &Path) -> std::io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.read(true);
    #[cfg(windows)]
    {
        // FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE
        options.share_mode(0x1 | 0x2 | 0x4);
    }
    options.open(path).await
}
