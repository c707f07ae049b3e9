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

//! Bounded concurrent sessions on one SSH connection.
//!
//! Servers enforce `MaxSessions` per connection and fail channel opens
//! silently beyond it. The limiter keeps the client on the right side of
//! that bound; every open channel holds one permit, returned when the
//! session drops.

use std::sync::Arc;

use russh::client::Msg;
use russh::Channel;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Counting semaphore gating concurrent sessions.
pub(crate) struct SessionLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl SessionLimiter {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take one slot, or fail with the cancellation error. A token that
    /// is already cancelled fails immediately without taking a slot; when
    /// cancellation races acquisition, the losing side cannot leak a
    /// permit.
    pub(crate) async fn acquire(
        &self,
        ctx: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, Error> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| Error::SessionNotOpen)
            }
            _ = ctx.cancelled() => Err(Error::Cancelled),
        }
    }

    pub(crate) fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

/// An open channel holding one limiter slot.
///
/// Dropping the session returns the slot exactly once, whether or not
/// closing the underlying channel succeeded.
pub(crate) struct Session {
    pub(crate) channel: Channel<Msg>,
    _permit: OwnedSemaphorePermit,
}

impl Session {
    pub(crate) fn new(channel: Channel<Msg>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            channel,
            _permit: permit,
        }
    }

    /// Split into the raw channel and the permit keeping its slot held.
    /// Used by the transfer flows that hand the channel to a subsystem.
    pub(crate) fn into_parts(self) -> (Channel<Msg>, OwnedSemaphorePermit) {
        (self.channel, self._permit)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn outstanding_count_never_exceeds_capacity() {
        let limiter = Arc::new(SessionLimiter::new(2));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let permit = limiter.acquire(&CancellationToken::new()).await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(limiter.available(), limiter.capacity());
    }

    #[tokio::test]
    async fn cancelled_token_fails_without_taking_a_slot() {
        let limiter = SessionLimiter::new(1);
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = limiter.acquire(&ctx).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn cancellation_while_blocked_releases_nothing() {
        let limiter = Arc::new(SessionLimiter::new(1));
        let held = limiter.acquire(&CancellationToken::new()).await.unwrap();

        let ctx = CancellationToken::new();
        let waiter = {
            let limiter = Arc::clone(&limiter);
            let ctx = ctx.clone();
            tokio::spawn(async move { limiter.acquire(&ctx).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();
        let result = waiter.await.unwrap();
        assert!(result.unwrap_err().is_cancelled());

        drop(held);
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn permit_returns_on_drop() {
        let limiter = SessionLimiter::new(3);
        let a = limiter.acquire(&CancellationToken::new()).await.unwrap();
        let b = limiter.acquire(&CancellationToken::new()).await.unwrap();
        assert_eq!(limiter.available(), 1);
        drop(a);
        drop(b);
        assert_eq!(limiter.available(), 3);
    }
}
