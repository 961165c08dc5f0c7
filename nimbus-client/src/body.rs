/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use bytes::{Buf, Bytes};
use http::{HeaderMap, HeaderValue};
use hyper::body::HttpBody;
use std::error::Error;
use std::pin::Pin;
use std::task::{Context, Poll};

pub type BodyError = Box<dyn Error + Send + Sync>;

/// SdkBody type
///
/// This is the body used for dispatching all HTTP requests. Request bodies are
/// typically `Once`: fully buffered and replayable, which is what makes retry
/// possible. Response bodies arrive as `Streaming` and are collected with
/// [`read_body`] before any parsing happens.
pub enum SdkBody {
    Once(Option<Bytes>),
    Streaming(hyper::Body),
}

impl SdkBody {
    pub fn empty() -> Self {
        SdkBody::Once(None)
    }

    /// If the body is fully buffered, returns the bytes. Streaming bodies
    /// return `None`.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            SdkBody::Once(Some(bytes)) => Some(bytes),
            SdkBody::Once(None) => Some(&[]),
            SdkBody::Streaming(_) => None,
        }
    }

    /// Clones the body if it is replayable. Streaming bodies cannot be cloned,
    /// and requests carrying them cannot be retried.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            SdkBody::Once(bytes) => Some(SdkBody::Once(bytes.clone())),
            SdkBody::Streaming(_) => None,
        }
    }

    fn poll_inner(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, BodyError>>> {
        match self {
            SdkBody::Once(ref mut opt) => match opt.take() {
                Some(bytes) if bytes.is_empty() => Poll::Ready(None),
                Some(bytes) => Poll::Ready(Some(Ok(bytes))),
                None => Poll::Ready(None),
            },
            SdkBody::Streaming(body) => Pin::new(body)
                .poll_data(cx)
                .map(|opt| opt.map(|res| res.map_err(|e| e.into()))),
        }
    }
}

impl std::fmt::Debug for SdkBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdkBody::Once(Some(bytes)) => f.debug_tuple("Once").field(&bytes.len()).finish(),
            SdkBody::Once(None) => f.debug_tuple("Once").field(&0).finish(),
            SdkBody::Streaming(_) => f.debug_tuple("Streaming").finish(),
        }
    }
}

impl From<&str> for SdkBody {
    fn from(s: &str) -> Self {
        SdkBody::Once(Some(Bytes::copy_from_slice(s.as_bytes())))
    }
}

impl From<String> for SdkBody {
    fn from(s: String) -> Self {
        SdkBody::Once(Some(Bytes::from(s.into_bytes())))
    }
}

impl From<Bytes> for SdkBody {
    fn from(bytes: Bytes) -> Self {
        SdkBody::Once(Some(bytes))
    }
}

impl From<Vec<u8>> for SdkBody {
    fn from(data: Vec<u8>) -> SdkBody {
        Self::from(Bytes::from(data))
    }
}

impl From<hyper::Body> for SdkBody {
    fn from(body: hyper::Body) -> SdkBody {
        SdkBody::Streaming(body)
    }
}

impl HttpBody for SdkBody {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_data(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        self.poll_inner(cx)
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap<HeaderValue>>, Self::Error>> {
        Poll::Ready(Ok(None))
    }
}

/// Collects an [`SdkBody`] into memory.
pub async fn read_body(body: SdkBody) -> Result<Bytes, BodyError> {
    match body {
        SdkBody::Once(Some(bytes)) => Ok(bytes),
        SdkBody::Once(None) => Ok(Bytes::new()),
        SdkBody::Streaming(body) => {
            let mut body = body;
            let mut output = Vec::new();
            while let Some(buf) = hyper::body::HttpBody::data(&mut body).await {
                let mut buf = buf?;
                while buf.has_remaining() {
                    let chunk = buf.chunk();
                    output.extend_from_slice(chunk);
                    let len = chunk.len();
                    buf.advance(len);
                }
            }
            Ok(Bytes::from(output))
        }
    }
}
