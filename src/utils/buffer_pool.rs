// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Buffer pool for reducing allocations in hot paths.
//!
//! Output capture and chunked file transfer run once per command or chunk;
//! pooled buffers follow a get-reset-return lifecycle so repeated runs on
//! the same client reuse their allocations.

use std::sync::{Arc, Mutex, OnceLock};

/// Capture tier (8KB): stdout/stderr accumulation for one command run.
const CAPTURE_BUFFER_SIZE: usize = 8192;

/// Transfer tier (32KB): the chunk size of SCP/SFTP streaming copies.
const TRANSFER_BUFFER_SIZE: usize = 32 * 1024;

/// Buffers kept per tier. Bounds pooled memory under load.
const MAX_POOL_SIZE: usize = 16;

/// A reusable buffer that returns to its pool when dropped.
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Contents interpreted as UTF-8, lossily.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.buffer.clear();
        if let Ok(mut pool) = self.pool.lock() {
            if pool.len() < MAX_POOL_SIZE {
                pool.push(std::mem::take(&mut self.buffer));
            }
        }
    }
}

/// Thread-safe two-tier buffer pool.
pub struct BufferPool {
    capture_buffers: Arc<Mutex<Vec<Vec<u8>>>>,
    transfer_buffers: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            capture_buffers: Arc::new(Mutex::new(Vec::new())),
            transfer_buffers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get a capture buffer (8KB tier) for command output.
    pub fn get_capture_buffer(&self) -> PooledBuffer {
        Self::get_from(&self.capture_buffers, CAPTURE_BUFFER_SIZE)
    }

    /// Get a transfer buffer (32KB tier) for chunked copies.
    pub fn get_transfer_buffer(&self) -> PooledBuffer {
        Self::get_from(&self.transfer_buffers, TRANSFER_BUFFER_SIZE)
    }

    fn get_from(pool: &Arc<Mutex<Vec<Vec<u8>>>>, default_capacity: usize) -> PooledBuffer {
        let buffer = match pool.lock() {
            Ok(mut guard) => guard
                .pop()
                .unwrap_or_else(|| Vec::with_capacity(default_capacity)),
            Err(_) => Vec::with_capacity(default_capacity),
        };
        PooledBuffer {
            buffer,
            pool: Arc::clone(pool),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_BUFFER_POOL: OnceLock<BufferPool> = OnceLock::new();

/// The process-wide buffer pool instance.
pub fn global_buffer_pool() -> &'static BufferPool {
    GLOBAL_BUFFER_POOL.get_or_init(BufferPool::new)
}
