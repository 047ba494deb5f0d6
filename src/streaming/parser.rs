//! Incremental frame parser for Ollama NDJSON streams
//!
//! Network chunks do not line up with frames: one read may carry half a
//! frame or several. Bytes are buffered and complete JSON objects are cut out
//! by bracket matching:
//! - Buffer: 1MB maximum
//! - Algorithm: O(n) single pass bracket matching, string-aware
//! - Whitespace (the newline delimiters) between frames is skipped

use serde::Deserialize;

use crate::errors::{RagError, Result};

/// Maximum buffer size (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// One `/api/generate` frame
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Incremental frame parser
#[derive(Debug)]
pub struct ChunkParser {
    buffer: Vec<u8>,
    max_buffer_size: usize,
}

impl ChunkParser {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    /// Create parser with custom buffer capacity
    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_buffer_size,
        }
    }

    /// Append bytes read from the network
    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.buffer.len() + bytes.len() > self.max_buffer_size {
            return Err(RagError::Generation(format!(
                "Stream buffer overflow: {} bytes exceeds maximum {}",
                self.buffer.len() + bytes.len(),
                self.max_buffer_size
            )));
        }

        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Next complete frame, if one is buffered
    pub fn next_frame(&mut self) -> Result<Option<GenerateChunk>> {
        let leading = self
            .buffer
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.buffer.drain(..leading);

        if self.buffer.is_empty() {
            return Ok(None);
        }
        if self.buffer[0] != b'{' {
            return Err(RagError::Generation(format!(
                "Unexpected data in provider stream: {}",
                String::from_utf8_lossy(&self.buffer[..self.buffer.len().min(64)])
            )));
        }

        let Some(end) = self.find_object_end()? else {
            return Ok(None);
        };

        let frame = serde_json::from_slice(&self.buffer[..=end])
            .map_err(|e| RagError::Generation(format!("Malformed provider frame: {}", e)));
        self.buffer.drain(..=end);
        frame.map(Some)
    }

    /// Index of the brace closing the object that starts at 0
    fn find_object_end(&self) -> Result<Option<usize>> {
        let mut depth: i64 = 0;
        let mut in_string = false;
        let mut escape_next = false;

        for (i, &byte) in self.buffer.iter().enumerate() {
            if escape_next {
                escape_next = false;
                continue;
            }

            if in_string {
                match byte {
                    b'\\' => escape_next = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }

            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Some(i));
                    }
                    if depth < 0 {
                        return Err(RagError::Generation(
                            "Mismatched braces: too many closing braces".to_string(),
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(None)
    }

    /// Bytes that do not yet form a whole frame
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Whether only whitespace remains
    pub fn is_drained(&self) -> bool {
        self.buffer.iter().all(|b| b.is_ascii_whitespace())
    }
}

impl Default for ChunkParser {
    fn default() -> Self {
        Self::new()
    }
}
