//! Scoped exclusive access to the record-store adapter.
//!
//! The adapter behind [`PersonStore`](crate::store::PersonStore) must not interleave calls from
//! different logical operations on one connection. Any code path issuing more than one
//! dependent call opens an [`AdapterSession`] first and issues every call through it. The
//! session releases the adapter when dropped, so early returns and `?` release it too.

use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Wraps an adapter so only one session at a time can use it.
pub struct SerializedAdapter<A: ?Sized> {
    gate: Mutex<()>,
    adapter: Arc<A>,
}

impl<A: ?Sized> SerializedAdapter<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        Self {
            gate: Mutex::new(()),
            adapter,
        }
    }

    /// Waits for exclusive use of the adapter.
    pub async fn session(&self) -> AdapterSession<'_, A> {
        let guard = self.gate.lock().await;
        AdapterSession {
            _guard: guard,
            adapter: &self.adapter,
        }
    }
}

/// Exclusive use of the adapter for a batch of dependent calls.
pub struct AdapterSession<'a, A: ?Sized> {
    _guard: MutexGuard<'a, ()>,
    adapter: &'a A,
}

impl<A: ?Sized> Deref for AdapterSession<'_, A> {
    type Target = A;

    fn deref(&self) -> &A {
        self.adapter
    }
}
