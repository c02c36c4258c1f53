// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Content Stream
//!
//! The chunked-read contract for `bytestream`/`stringstream` payloads:
//! `open`, `read(n)`, `close`. A stream must be consumed exactly once and
//! closed on every exit path. [`ContentStreamGuard`] wraps any
//! `ContentStream` so a `Drop` impl can close it as a last resort if a
//! caller returns early without calling `close` explicitly; relying on
//! `Drop` alone is not a substitute for calling `close`, since `Drop`
//! cannot report an error from the close.

use crate::error::PipelineError;
use async_trait::async_trait;

#[async_trait]
pub trait ContentStream: Send {
    async fn open(&mut self) -> Result<(), PipelineError>;

    /// Reads up to `max_bytes` (or an implementation-chosen chunk size if
    /// `None`). Returns an empty vector at end of stream.
    async fn read(&mut self, max_bytes: Option<usize>) -> Result<Vec<u8>, PipelineError>;

    async fn close(&mut self) -> Result<(), PipelineError>;
}

/// Drains a stream to completion, closing it on every exit path (including
/// a read error) and returning the concatenated bytes.
pub async fn drain_and_close(mut stream: Box<dyn ContentStream>) -> Result<Vec<u8>, PipelineError> {
    let result = async {
        stream.open().await?;
        let mut buf = Vec::new();
        loop {
            let chunk = stream.read(Some(64 * 1024)).await?;
            if chunk.is_empty() {
                break;
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }
    .await;
    stream.close().await?;
    result
}

/// Hashes a stream incrementally without buffering the whole payload,
/// closing it on every exit path.
pub async fn hash_and_close(mut stream: Box<dyn ContentStream>) -> Result<String, PipelineError> {
    use sha2::{Digest, Sha256};
    let result = async {
        stream.open().await?;
        let mut hasher = Sha256::new();
        loop {
            let chunk = stream.read(Some(64 * 1024)).await?;
            if chunk.is_empty() {
                break;
            }
            hasher.update(&chunk);
        }
        let digest = hasher.finalize();
        Ok(hex::encode(&digest[..16]))
    }
    .await;
    stream.close().await?;
    result
}

/// Replays an in-memory buffer in fixed-size chunks. Stage behaviors that
/// have already materialized a payload's bytes (a local file read, say)
/// use this to drive that payload through [`hash_and_close`]/[`drain_and_close`]
/// rather than hashing the buffer directly, so a `bytestream`/`stringstream`
/// artifact's declared serialization type actually goes through the
/// `open`/`read`/`close` contract its type promises callers.
pub struct BufferContentStream {
    remaining: std::collections::VecDeque<u8>,
}

impl BufferContentStream {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            remaining: bytes.into(),
        }
    }
}

#[async_trait]
impl ContentStream for BufferContentStream {
    async fn open(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn read(&mut self, max_bytes: Option<usize>) -> Result<Vec<u8>, PipelineError> {
        let take = max_bytes.unwrap_or(64 * 1024).min(self.remaining.len());
        Ok(self.remaining.drain(..take).collect())
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}
