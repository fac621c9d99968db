//! Configuration options for the CaskDb storage engine.

/// Configuration options for opening a storage directory.
#[derive(Debug, Clone)]
pub struct Options {
    /// Name of the log file inside the storage directory.
    /// Default: "data"
    pub log_file_name: String,

    /// Sync every append to disk before reporting it written.
    /// Disabling increases throughput at the cost of durability on power loss.
    /// Default: false
    pub sync_writes: bool,

    /// Trigger a compaction automatically after this many appends.
    /// Set to `None` to disable automatic compaction.
    /// Default: None
    pub auto_compact_threshold: Option<u64>,

    /// Capacity of the bounded channel backing [`Storage::stream`].
    /// The producer runs at most this many records ahead of the consumer.
    /// Default: 16
    ///
    /// [`Storage::stream`]: crate::Storage::stream
    pub stream_buffer: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            log_file_name: "data".to_string(),
            sync_writes: false,
            auto_compact_threshold: None,
            stream_buffer: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert_eq!(options.log_file_name, "data");
        assert!(!options.sync_writes);
        assert_eq!(options.auto_compact_threshold, None);
        assert_eq!(options.stream_buffer, 16);
    }
}
