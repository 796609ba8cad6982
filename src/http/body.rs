//! Request bodies: in-memory bytes, text, or a shared readable stream.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;

/// A request body as handed to the cache core.
///
/// Cloning a [`Body::Stream`] shares the underlying reader, the same way a
/// copied request shares its file handle.
#[derive(Clone)]
pub enum Body {
    Bytes(Bytes),
    Text(String),
    Stream(BodyStream),
}

impl Body {
    /// Wraps a seekable reader; its position is restored after normalization.
    pub fn seekable<R>(reader: R) -> Self
    where
        R: Read + Seek + Send + 'static,
    {
        Self::Stream(BodyStream::new(StreamKind::Seekable(Box::new(reader))))
    }

    /// Wraps a forward-only reader. It is left consumed after normalization.
    pub fn forward_only<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::Stream(BodyStream::new(StreamKind::Forward(Box::new(reader))))
    }

    /// Returns `true` for an in-memory body with no content.
    ///
    /// Streams are never considered empty until they are read.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bytes(b) => b.is_empty(),
            Self::Text(s) => s.is_empty(),
            Self::Stream(_) => false,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

enum StreamKind {
    Seekable(Box<dyn ReadSeek>),
    Forward(Box<dyn Read + Send>),
}

/// A readable body shared between clones of a request.
#[derive(Clone)]
pub struct BodyStream {
    inner: Arc<Mutex<StreamKind>>,
}

impl BodyStream {
    fn new(kind: StreamKind) -> Self {
        Self {
            inner: Arc::new(Mutex::new(kind)),
        }
    }

    /// Reads the stream to its end and then tries to rewind it to the start.
    ///
    /// The rewind is attempted whether or not the read succeeded. The outer
    /// result is the read; the inner one reports the rewind, which fails for
    /// forward-only streams.
    pub fn read_and_rewind(&self) -> io::Result<(Vec<u8>, io::Result<()>)> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = Vec::new();
        let read = match &mut *guard {
            StreamKind::Seekable(r) => r.read_to_end(&mut buf),
            StreamKind::Forward(r) => r.read_to_end(&mut buf),
        };
        let rewind = match &mut *guard {
            StreamKind::Seekable(r) => r.seek(SeekFrom::Start(0)).map(|_| ()),
            StreamKind::Forward(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "body stream is not seekable",
            )),
        };
        read.map(|_| (buf, rewind))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn seekable_stream_is_rewound() {
        let body = Body::seekable(Cursor::new(b"payload".to_vec()));
        let Body::Stream(stream) = body else {
            panic!("expected a stream body");
        };
        let (first, rewind) = stream.read_and_rewind().unwrap();
        assert!(rewind.is_ok());
        let (second, _) = stream.read_and_rewind().unwrap();
        assert_eq!(first, b"payload");
        assert_eq!(second, b"payload");
    }

    #[test]
    fn forward_only_stream_reports_failed_rewind() {
        let body = Body::forward_only(&b"once"[..]);
        let Body::Stream(stream) = body else {
            panic!("expected a stream body");
        };
        let (first, rewind) = stream.read_and_rewind().unwrap();
        assert_eq!(first, b"once");
        assert_eq!(rewind.unwrap_err().kind(), io::ErrorKind::Unsupported);
        let (second, _) = stream.read_and_rewind().unwrap();
        assert!(second.is_empty());
    }
}
