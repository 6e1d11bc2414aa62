//! A lease-based, crash-tolerant MapReduce system.
//!
//! Users supply a map and a reduce function; a single coordinator hands
//! map and reduce tasks to a pool of unreliable workers that pull work over
//! gRPC. Workers write to private files and the coordinator publishes them
//! with an atomic rename once it accepts the completion, so a task that ends
//! up running twice never produces duplicate output.

use bytes::Bytes;
use std::hash::Hasher;

pub mod cmd;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod merge;
pub mod publish;
pub mod rpc;
pub mod standalone;
pub mod store;
pub mod task;
pub mod utils;
pub mod worker;
pub mod workload;

pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use worker::{TaskSource, Worker, WorkerStats};

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// The output of an application map function.
///
/// There are 2 layers of [`anyhow::Result`]s here. The outer layer
/// accounts for errors that arise while creating the iterator.
/// The inner layer accounts for errors that occur during iteration.
///
/// This accomodates both batch (all keys emitted at once) and lazy
/// (keys only emitted when the iterator is consumed) map operations.
pub type MapOutput = anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<KeyValue>>>>;

/// A map function takes a key-value pair and auxiliary arguments.
///
/// The key is the input file identifier and the value is the whole file.
/// It returns an iterator that yields intermediate key-value pairs.
pub type MapFn = fn(kv: KeyValue, aux: Bytes) -> MapOutput;

/// A reduce function takes in a key, an iterator over every value emitted
/// for that key, and an auxiliary argument. It returns an [`anyhow::Result`]
/// containing a single output value.
pub type ReduceFn = fn(
    key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    aux: Bytes,
) -> anyhow::Result<Bytes>;

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyValue {
    /// The key.
    pub key: Bytes,
    /// The value.
    pub value: Bytes,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Get the key of this key-value pair.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn key(&self) -> Bytes {
        self.key.clone()
    }

    /// Get the value of this key-value pair.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn value(&self) -> Bytes {
        self.value.clone()
    }

    /// Consumes the key-value pair and returns the key.
    #[inline]
    pub fn into_key(self) -> Bytes {
        self.key
    }

    /// Consumes the key-value pair and returns the value.
    #[inline]
    pub fn into_value(self) -> Bytes {
        self.value
    }
}

/////////////////////////////////////////////////////////////////////////////
// Partitioning
/////////////////////////////////////////////////////////////////////////////

/// Hashes an intermediate key with FNV-1a.
///
/// The low bits of the 64-bit hash repeat for keys that differ only in their
/// last byte, so the high half is folded in before masking to 31 bits.
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key);
    let hash = hasher.finish();
    (((hash >> 32) ^ hash) & 0x7fff_ffff) as u32
}

/// Compute the reduce shard for a given key: `ihash(key) % n_reduce`.
///
/// The same key always lands on the same shard, no matter which map task
/// (or which attempt of a map task) emitted it.
#[inline]
pub fn shard(key: &[u8], n_reduce: u32) -> u32 {
    debug_assert!(n_reduce > 0, "n_reduce must be positive");
    ihash(key) % n_reduce
}
