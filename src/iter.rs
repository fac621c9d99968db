//! Iteration over the whole segment log.
//!
//! Both flavors scan the raw log in on-disk order rather than the key index,
//! decoding each record as it is reached. A key written multiple times
//! therefore shows up multiple times unless a compaction ran first.
//!
//! [`Records`] is the pull-based iterator. [`RecordStream`] is its
//! push-based equivalent for backpressure-aware consumers: a producer thread
//! feeds a bounded channel, so it only scans ahead as far as the consumer
//! has granted buffer space.

use crate::error::Result;
use crate::segment::{Scan, SegmentLog};
use crate::serializer::Serializer;
use crate::{Entry, Meta};
use crossbeam::channel::{bounded, Receiver};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::thread::JoinHandle;

/// Lazy, finite iterator over every record in a log.
///
/// Created by [`Storage::records`](crate::Storage::records); each call
/// restarts from offset 0. The first error ends the iteration.
pub struct Records<'a, S, T> {
    scan: Scan<'a>,
    serializer: &'a S,
    done: bool,
    _marker: PhantomData<T>,
}

impl<'a, S: Serializer, T: DeserializeOwned> Records<'a, S, T> {
    pub(crate) fn new(log: &'a SegmentLog, serializer: &'a S) -> Result<Self> {
        Ok(Self {
            scan: log.scan()?,
            serializer,
            done: false,
            _marker: PhantomData,
        })
    }
}

impl<S: Serializer, T: DeserializeOwned> Iterator for Records<'_, S, T> {
    type Item = Result<Entry<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = self.scan.next()?;
        let decoded = item.and_then(|(_, segment)| {
            let meta: Meta = self.serializer.from_bytes(&segment.metadata)?;
            let data: T = self.serializer.from_bytes(&segment.data)?;
            Ok(Entry { meta, data })
        });

        if decoded.is_err() {
            self.done = true;
        }
        Some(decoded)
    }
}

/// Push-based record stream backed by a producer thread and a bounded
/// channel.
///
/// Created by [`Storage::stream`](crate::Storage::stream). The producer
/// opens its own read handle on the log file, scans it sequentially, and
/// blocks whenever the channel is full, so it never runs more than the
/// configured buffer ahead of the consumer. Dropping the stream disconnects
/// the channel and the producer exits on its next send.
pub struct RecordStream<T> {
    receiver: Option<Receiver<Result<Entry<T>>>>,
    producer: Option<JoinHandle<()>>,
}

impl<T: DeserializeOwned + Send + 'static> RecordStream<T> {
    pub(crate) fn spawn<S>(path: PathBuf, serializer: S, capacity: usize) -> Result<Self>
    where
        S: Serializer + Clone + Send + 'static,
    {
        // Open before spawning so the caller sees open failures directly.
        let log = SegmentLog::open(&path)?;
        let (sender, receiver) = bounded(capacity.max(1));

        let producer = std::thread::spawn(move || {
            let scan = match log.scan() {
                Ok(scan) => scan,
                Err(e) => {
                    let _ = sender.send(Err(e));
                    return;
                }
            };

            for item in scan {
                let decoded = item.and_then(|(_, segment)| {
                    let meta: Meta = serializer.from_bytes(&segment.metadata)?;
                    let data: T = serializer.from_bytes(&segment.data)?;
                    Ok(Entry { meta, data })
                });

                let failed = decoded.is_err();
                if sender.send(decoded).is_err() {
                    // Consumer went away
                    return;
                }
                if failed {
                    return;
                }
            }
        });

        Ok(Self { receiver: Some(receiver), producer: Some(producer) })
    }
}

impl<T> Iterator for RecordStream<T> {
    type Item = Result<Entry<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.as_ref()?.recv().ok()
    }
}

impl<T> Drop for RecordStream<T> {
    fn drop(&mut self) {
        // Disconnect first so a blocked producer unblocks, then reap it.
        self.receiver.take();
        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }
    }
}
