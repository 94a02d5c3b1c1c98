use crate::domain::event::PaymentEvent;
use crate::domain::ports::EventStore;
use crate::error::{Result, SchedulerError};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for serialized payment events.
pub const CF_EVENTS: &str = "events";
/// Column Family holding the next sequence number per work id.
pub const CF_SEQUENCES: &str = "sequences";

/// A persistent event store backed by RocksDB.
///
/// Events are keyed `"{work_id}/{seq:020}"`; the zero-padded sequence makes
/// lexicographic key order equal append order, so `history` is a single
/// prefix scan. Appends are serialized by one mutex to keep the
/// read-sequence/write-event pair atomic.
#[derive(Clone)]
pub struct RocksDbEventStore {
    db: Arc<DB>,
    append_lock: Arc<Mutex<()>>,
}

impl RocksDbEventStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_events = ColumnFamilyDescriptor::new(CF_EVENTS, Options::default());
        let cf_sequences = ColumnFamilyDescriptor::new(CF_SEQUENCES, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_events, cf_sequences])?;

        Ok(Self {
            db: Arc::new(db),
            append_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            SchedulerError::Internal(Box::new(std::io::Error::other(format!(
                "column family '{name}' not found"
            ))))
        })
    }
}

#[async_trait]
impl EventStore for RocksDbEventStore {
    async fn append(&self, event: PaymentEvent) -> Result<()> {
        let _guard = self.append_lock.lock().await;

        let sequences = self.cf(CF_SEQUENCES)?;
        let seq = match self.db.get_cf(&sequences, event.work_id.as_bytes())? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    SchedulerError::Internal(Box::new(std::io::Error::other(
                        "corrupt sequence counter",
                    )))
                })?;
                u64::from_be_bytes(bytes)
            }
            None => 0,
        };

        let events = self.cf(CF_EVENTS)?;
        let key = format!("{}/{:020}", event.work_id, seq);
        let value = serde_json::to_vec(&event)?;
        self.db.put_cf(&events, key.as_bytes(), value)?;
        self.db
            .put_cf(&sequences, event.work_id.as_bytes(), (seq + 1).to_be_bytes())?;

        Ok(())
    }

    async fn history(&self, work_id: &str) -> Result<Vec<PaymentEvent>> {
        let events = self.cf(CF_EVENTS)?;
        let prefix = format!("{work_id}/");

        let mut history = Vec::new();
        let iter = self.db.iterator_cf(
            events,
            rocksdb::IteratorMode::From(prefix.as_bytes(), rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            history.push(serde_json::from_slice(&value)?);
        }

        Ok(history)
    }
}
