//! Data-parallel device runtime.
//!
//! A [`Device`] is the execution resource on which the grouped addressing
//! primitives run. It is backed by a rayon pool: either the global pool or a
//! dedicated [`rayon::ThreadPool`] of a chosen width. Operations submitted via
//! [`Device::install`] complete before `install` returns, so a chain of
//! primitives needs no extra synchronisation; only the final host read does.

use std::sync::Arc;

use rayon::ThreadPool;

use crate::mesh_error::AgglomError;

/// Handle to a data-parallel execution resource.
#[derive(Clone, Debug, Default)]
pub struct Device {
    pool: Option<Arc<ThreadPool>>,
}

impl Device {
    /// Device backed by the process-wide rayon pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Select a dedicated device with `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self, AgglomError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("ldu-agglom-device-{i}"))
            .build()
            .map_err(|e| AgglomError::DeviceFault(e.to_string()))?;
        log::debug!("selected device with {} worker threads", pool.current_num_threads());
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    /// Build from an optional width; `None` selects the global device.
    pub fn from_threads(threads: Option<usize>) -> Result<Self, AgglomError> {
        match threads {
            Some(n) => Self::with_threads(n),
            None => Ok(Self::global()),
        }
    }

    /// Number of workers the global runtime can offer.
    pub fn available() -> usize {
        rayon::current_num_threads()
    }

    /// Number of workers of this device.
    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run `op` on this device and wait for it.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}
