//! Transaction handles
//!
//! Thin bucket-oriented views over redb transactions. A bucket is a redb
//! table with raw byte keys and values; iteration follows redb's key order
//! (lexicographic on the raw bytes).
//!
//! Both handles count what they do in a `TxStats`, which the store feeds to
//! the metrics recorder once the transaction completes.

use std::cell::Cell;

use redb::{
    ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition, TableHandle,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

type BucketDef<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

fn bucket_def(name: &str) -> BucketDef<'_> {
    TableDefinition::new(name)
}

/// Open a bucket in a read transaction, or return `$missing` from the
/// enclosing function when it does not exist.
macro_rules! open_or_return {
    ($txn:expr, $bucket:expr, $missing:expr) => {
        match $txn.open_table(bucket_def($bucket)) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok($missing),
            Err(err) => return Err(err.into()),
        }
    };
}

/// Engine-level statistics for one or more transactions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStats {
    pub gets: u64,
    pub puts: u64,
    pub deletes: u64,
    pub buckets_created: u64,
    pub buckets_deleted: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl TxStats {
    /// Work done between `earlier` and `self`
    pub fn since(&self, earlier: &TxStats) -> TxStats {
        TxStats {
            gets: self.gets.saturating_sub(earlier.gets),
            puts: self.puts.saturating_sub(earlier.puts),
            deletes: self.deletes.saturating_sub(earlier.deletes),
            buckets_created: self.buckets_created.saturating_sub(earlier.buckets_created),
            buckets_deleted: self.buckets_deleted.saturating_sub(earlier.buckets_deleted),
            bytes_read: self.bytes_read.saturating_sub(earlier.bytes_read),
            bytes_written: self.bytes_written.saturating_sub(earlier.bytes_written),
        }
    }

    /// Accumulate `other` into `self`
    pub fn absorb(&mut self, other: &TxStats) {
        self.gets = self.gets.saturating_add(other.gets);
        self.puts = self.puts.saturating_add(other.puts);
        self.deletes = self.deletes.saturating_add(other.deletes);
        self.buckets_created = self.buckets_created.saturating_add(other.buckets_created);
        self.buckets_deleted = self.buckets_deleted.saturating_add(other.buckets_deleted);
        self.bytes_read = self.bytes_read.saturating_add(other.bytes_read);
        self.bytes_written = self.bytes_written.saturating_add(other.bytes_written);
    }

    /// Field-wise maximum
    pub fn max(&self, other: &TxStats) -> TxStats {
        TxStats {
            gets: self.gets.max(other.gets),
            puts: self.puts.max(other.puts),
            deletes: self.deletes.max(other.deletes),
            buckets_created: self.buckets_created.max(other.buckets_created),
            buckets_deleted: self.buckets_deleted.max(other.buckets_deleted),
            bytes_read: self.bytes_read.max(other.bytes_read),
            bytes_written: self.bytes_written.max(other.bytes_written),
        }
    }
}

// =============================================================================
// Write Transaction
// =============================================================================

/// Read-write transaction handle passed to `Store::update` and `Store::batch`
///
/// Every change is discarded if the enclosing callback returns an error.
pub struct WriteTx<'a> {
    txn: &'a WriteTransaction,
    stats: Cell<TxStats>,
}

impl<'a> WriteTx<'a> {
    pub(crate) fn new(txn: &'a WriteTransaction) -> Self {
        Self {
            txn,
            stats: Cell::new(TxStats::default()),
        }
    }

    /// Statistics for this transaction so far
    pub fn stats(&self) -> TxStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut TxStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// Whether the bucket exists (including buckets created in this transaction)
    pub fn contains_bucket(&self, bucket: &str) -> Result<bool> {
        Ok(self.txn.list_tables()?.any(|table| table.name() == bucket))
    }

    /// Create the bucket if it does not exist yet
    pub fn create_bucket_if_not_exists(&self, bucket: &str) -> Result<()> {
        if self.contains_bucket(bucket)? {
            return Ok(());
        }
        self.txn.open_table(bucket_def(bucket))?;
        self.bump(|s| s.buckets_created += 1);
        Ok(())
    }

    /// Insert or overwrite a value, creating the bucket on first write
    pub fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.create_bucket_if_not_exists(bucket)?;

        let mut table = self.txn.open_table(bucket_def(bucket))?;
        table.insert(key, value)?;

        self.bump(|s| {
            s.puts += 1;
            s.bytes_written += value.len() as u64;
        });
        Ok(())
    }

    /// Read a value; `None` when the bucket or key is absent
    pub fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.contains_bucket(bucket)? {
            return Ok(None);
        }

        let table = self.txn.open_table(bucket_def(bucket))?;
        let value = table.get(key)?.map(|guard| guard.value().to_vec());

        self.bump(|s| {
            s.gets += 1;
            s.bytes_read += value.as_ref().map_or(0, |v| v.len() as u64);
        });
        Ok(value)
    }

    /// Remove a key. Returns whether it existed.
    pub fn delete(&self, bucket: &str, key: &[u8]) -> Result<bool> {
        if !self.contains_bucket(bucket)? {
            return Ok(false);
        }

        let mut table = self.txn.open_table(bucket_def(bucket))?;
        let removed = table.remove(key)?.is_some();

        if removed {
            self.bump(|s| s.deletes += 1);
        }
        Ok(removed)
    }

    /// Drop a bucket and every entry in it. Returns whether it existed.
    pub fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        let removed = self.txn.delete_table(bucket_def(bucket))?;
        if removed {
            self.bump(|s| s.buckets_deleted += 1);
        }
        Ok(removed)
    }

    /// Visit every entry of a bucket in key order
    ///
    /// Entries are collected before `f` runs, so `f` may write to the same
    /// bucket through this transaction.
    pub fn for_each<F>(&self, bucket: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        if !self.contains_bucket(bucket)? {
            return Ok(());
        }

        let entries = {
            let table = self.txn.open_table(bucket_def(bucket))?;
            let mut entries = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                entries.push((key.value().to_vec(), value.value().to_vec()));
            }
            entries
        };

        for (key, value) in &entries {
            self.bump(|s| s.bytes_read += value.len() as u64);
            f(key, value)?;
        }
        Ok(())
    }

    /// Names of all buckets, sorted
    pub fn bucket_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .txn
            .list_tables()?
            .map(|table| table.name().to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}

// =============================================================================
// Read Transaction
// =============================================================================

/// Read-only transaction handle passed to `Store::view`
///
/// Sees a consistent point-in-time snapshot of the store.
pub struct ReadTx<'a> {
    txn: &'a ReadTransaction,
    stats: Cell<TxStats>,
}

impl<'a> ReadTx<'a> {
    pub(crate) fn new(txn: &'a ReadTransaction) -> Self {
        Self {
            txn,
            stats: Cell::new(TxStats::default()),
        }
    }

    /// Statistics for this transaction so far
    pub fn stats(&self) -> TxStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut TxStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// Whether the bucket exists
    pub fn contains_bucket(&self, bucket: &str) -> Result<bool> {
        Ok(self.txn.list_tables()?.any(|table| table.name() == bucket))
    }

    /// Read a value; `None` when the bucket or key is absent
    pub fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = open_or_return!(self.txn, bucket, None);
        let value = table.get(key)?.map(|guard| guard.value().to_vec());

        self.bump(|s| {
            s.gets += 1;
            s.bytes_read += value.as_ref().map_or(0, |v| v.len() as u64);
        });
        Ok(value)
    }

    /// Visit every entry of a bucket in key order
    pub fn for_each<F>(&self, bucket: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        let table = open_or_return!(self.txn, bucket, ());

        for entry in table.iter()? {
            let (key, value) = entry?;
            let value = value.value();
            self.bump(|s| s.bytes_read += value.len() as u64);
            f(key.value(), value)?;
        }
        Ok(())
    }

    /// Number of keys in a bucket (0 when absent)
    pub fn bucket_len(&self, bucket: &str) -> Result<u64> {
        let table = open_or_return!(self.txn, bucket, 0);
        Ok(table.len()?)
    }

    /// Names of all buckets, sorted
    pub fn bucket_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .txn
            .list_tables()?
            .map(|table| table.name().to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}
