//! Pooling of single-owner cryptographic engines.
//!
//! RSA / ECDSA backends carry per-operation state (blinding RNGs, precomputed
//! CRT parameters) that must not be shared between two in-flight operations.
//! A pool hands out one engine per operation and takes it back on every exit
//! path: [`PooledEngine`] returns its engine in `Drop`, so an early `?` or a
//! panic during signing cannot leak a handle.

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

/// Engines retained for reuse; beyond this, returned engines are dropped.
const MAX_IDLE_ENGINES: usize = 8;

pub(crate) struct ObjectPool<E> {
    idle: Mutex<Vec<E>>,
    factory: Box<dyn Fn() -> E + Send + Sync>,
}

impl<E> ObjectPool<E> {
    pub fn new(factory: impl Fn() -> E + Send + Sync + 'static) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            factory: Box::new(factory),
        }
    }

    /// Takes an idle engine or constructs a fresh one.
    pub fn acquire(&self) -> PooledEngine<'_, E> {
        let engine = self
            .idle
            .lock()
            .expect("engine pool poisoned")
            .pop()
            .unwrap_or_else(|| (self.factory)());
        PooledEngine {
            pool: self,
            engine: Some(engine),
        }
    }

    fn release(&self, engine: E) {
        let mut idle = self.idle.lock().expect("engine pool poisoned");
        if idle.len() < MAX_IDLE_ENGINES {
            idle.push(engine);
        }
    }

    /// Drops all idle engines.
    pub fn drain(&self) {
        self.idle.lock().expect("engine pool poisoned").clear();
    }
}

impl<E> std::fmt::Debug for ObjectPool<E> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let idle = self.idle.lock().map(|idle| idle.len()).unwrap_or(0);
        formatter
            .debug_struct("ObjectPool")
            .field("idle", &idle)
            .finish()
    }
}

/// Scoped engine acquisition; the engine goes back to the pool on drop.
pub(crate) struct PooledEngine<'a, E> {
    pool: &'a ObjectPool<E>,
    engine: Option<E>,
}

impl<E> Deref for PooledEngine<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.engine.as_ref().expect("engine taken")
    }
}

impl<E> DerefMut for PooledEngine<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.engine.as_mut().expect("engine taken")
    }
}

impl<E> Drop for PooledEngine<'_, E> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.release(engine);
        }
    }
}
