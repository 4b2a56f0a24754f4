//! Link registry backed by the embedded redb database
//!
//! Stores short links by hash, an owner index for listing links per
//! submitter, and the append-only click log used by the ranking aggregator.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{ClickEvent, Safety, ShortLink};

/// Main table for storing short links
///
/// Key: hash of the target URL
/// Value: JSON-serialized ShortLink
pub const TABLE_LINKS: TableDefinition<&str, &str> = TableDefinition::new("links_v1");

/// Index of links by submitter
///
/// Key: Composite key in format "{owner_ip}|{created_at_micros}|{hash}"
/// Value: hash
///
/// The zero-padded timestamp keeps one owner's links in creation order.
/// `created_at` never changes once a link exists, so re-saving a link under
/// the same owner hits the same key and the index never holds duplicates.
pub const TABLE_OWNER_INDEX: TableDefinition<&str, &str> = TableDefinition::new("owner_index_v1");

/// Append-only click log
///
/// Key: monotonically increasing sequence number
/// Value: JSON-serialized ClickEvent
pub const TABLE_CLICKS: TableDefinition<u64, &str> = TableDefinition::new("clicks_v1");

fn owner_key(link: &ShortLink) -> String {
    format!("{}|{:020}|{}", link.owner_ip, link.created_at.timestamp_micros(), link.hash)
}

/// Outcome of [`Registry::upgrade_qr`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrUpgrade {
    /// No link has this hash
    Missing,
    /// The link is classified unsafe and was left alone
    Unsafe(ShortLink),
    /// The link already had a QR code requested
    Unchanged(ShortLink),
    /// The stored link now has `qr` set
    Upgraded(ShortLink),
}

/// Pushes `key` to `counts` preserving the order in which keys were first seen.
fn tally(counts: &mut Vec<(String, u64)>, positions: &mut HashMap<String, usize>, key: &str) {
    match positions.get(key) {
        Some(&i) => counts[i].1 += 1,
        None => {
            positions.insert(key.to_string(), counts.len());
            counts.push((key.to_string(), 1));
        }
    }
}

/// Durable store of short links and clicks
///
/// Cheap to clone; every clone shares the same database handle.
#[derive(Clone)]
pub struct Registry {
    db: Arc<Database>,
}

impl Registry {
    /// Creates or opens the database at `db_path` and makes sure every table exists.
    ///
    /// ```no_run
    /// # use urlshortener::database::Registry;
    /// let registry = Registry::open("data.db").expect("Failed to initialize database");
    /// ```
    pub fn open(db_path: &str) -> Result<Self> {
        let db = Database::create(db_path)?;

        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(TABLE_LINKS)?;
            write_txn.open_table(TABLE_OWNER_INDEX)?;
            write_txn.open_table(TABLE_CLICKS)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    pub fn find_by_key(&self, hash: &str) -> Result<Option<ShortLink>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE_LINKS)?;

        match table.get(hash)? {
            Some(value) => Ok(Some(serde_json::from_str(value.value())?)),
            None => Ok(None),
        }
    }

    /// Inserts or overwrites a link, keeping the owner index in step.
    ///
    /// A stored safety classification always wins over `Unknown`, so a stale
    /// copy of the record cannot undo a verdict. Returns what was written.
    pub fn save(&self, link: &ShortLink) -> Result<ShortLink> {
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            let previous = match links.get(link.hash.as_str())? {
                Some(value) => Some(serde_json::from_str::<ShortLink>(value.value())?),
                None => None,
            };

            let mut record = link.clone();
            if let Some(previous) = &previous {
                if previous.safety != Safety::Unknown {
                    record.safety = previous.safety;
                }
            }
            let record_json = serde_json::to_string(&record)?;
            links.insert(record.hash.as_str(), record_json.as_str())?;

            let mut index = write_txn.open_table(TABLE_OWNER_INDEX)?;
            if let Some(previous) = &previous {
                index.remove(owner_key(previous).as_str())?;
            }
            index.insert(owner_key(&record).as_str(), record.hash.as_str())?;
            record
        };
        write_txn.commit()?;

        Ok(record)
    }

    /// Sets `qr` on an existing link and hands it to `owner_ip`/`sponsor`.
    ///
    /// The read and the write share one transaction, so a safety verdict
    /// applied concurrently is never overwritten. Unsafe links are not touched.
    pub fn upgrade_qr(&self, hash: &str, owner_ip: &str, sponsor: Option<String>) -> Result<QrUpgrade> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            let current = match links.get(hash)? {
                Some(value) => Some(serde_json::from_str::<ShortLink>(value.value())?),
                None => None,
            };

            match current {
                None => QrUpgrade::Missing,
                Some(link) if link.safety == Safety::Unsafe => QrUpgrade::Unsafe(link),
                Some(link) if link.qr => QrUpgrade::Unchanged(link),
                Some(link) => {
                    let previous_key = owner_key(&link);
                    let upgraded = ShortLink {
                        qr: true,
                        owner_ip: owner_ip.to_string(),
                        sponsor,
                        ..link
                    };
                    let record_json = serde_json::to_string(&upgraded)?;
                    links.insert(hash, record_json.as_str())?;

                    let mut index = write_txn.open_table(TABLE_OWNER_INDEX)?;
                    index.remove(previous_key.as_str())?;
                    index.insert(owner_key(&upgraded).as_str(), hash)?;
                    QrUpgrade::Upgraded(upgraded)
                }
            }
        };
        write_txn.commit()?;

        Ok(outcome)
    }

    /// Moves an `Unknown` link to `Safe`. Returns whether anything changed.
    pub fn mark_safe(&self, hash: &str) -> Result<bool> {
        self.classify(hash, Safety::Safe)
    }

    /// Moves an `Unknown` link to `Unsafe`. Returns whether anything changed.
    pub fn mark_unsafe(&self, hash: &str) -> Result<bool> {
        self.classify(hash, Safety::Unsafe)
    }

    // Read and update share one write transaction so a concurrent `save`
    // cannot slip in between.
    fn classify(&self, hash: &str, verdict: Safety) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let changed = {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            let current = match links.get(hash)? {
                Some(value) => Some(serde_json::from_str::<ShortLink>(value.value())?),
                None => None,
            };

            match current {
                Some(mut link) if link.safety == Safety::Unknown => {
                    link.safety = verdict;
                    let record_json = serde_json::to_string(&link)?;
                    links.insert(hash, record_json.as_str())?;
                    true
                }
                _ => false,
            }
        };
        write_txn.commit()?;

        Ok(changed)
    }

    /// Removes a link and its owner index entry. Clicks stay in the log.
    pub fn delete(&self, hash: &str) -> Result<Option<ShortLink>> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            let removed = match links.remove(hash)? {
                Some(value) => Some(serde_json::from_str::<ShortLink>(value.value())?),
                None => None,
            };

            if let Some(link) = &removed {
                let mut index = write_txn.open_table(TABLE_OWNER_INDEX)?;
                index.remove(owner_key(link).as_str())?;
            }
            removed
        };
        write_txn.commit()?;

        Ok(removed)
    }

    /// Lists the links submitted from `owner_ip`, newest first, one page at a time.
    pub fn list_by_owner(&self, owner_ip: &str, offset: usize, limit: usize) -> Result<Vec<ShortLink>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TABLE_OWNER_INDEX)?;
        let links = read_txn.open_table(TABLE_LINKS)?;

        // '}' sorts right after '|', so this covers every "{owner}|..." key
        let start_key = format!("{}|", owner_ip);
        let end_key = format!("{}}}", owner_ip);

        let mut results = Vec::new();
        for entry in index.range(start_key.as_str()..end_key.as_str())?.rev().skip(offset).take(limit) {
            let (_, hash) = entry?;
            if let Some(value) = links.get(hash.value())? {
                results.push(serde_json::from_str(value.value())?);
            }
        }

        Ok(results)
    }

    pub fn record_click(&self, click: &ClickEvent) -> Result<()> {
        let click_json = serde_json::to_string(click)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut clicks = write_txn.open_table(TABLE_CLICKS)?;
            let next = match clicks.last()? {
                Some((key, _)) => key.value() + 1,
                None => 0,
            };
            clicks.insert(next, click_json.as_str())?;
        }
        write_txn.commit()?;

        Ok(())
    }

    /// Clicks per hash, in the order each hash first appears in the log.
    pub fn click_counts_by_hash(&self) -> Result<Vec<(String, u64)>> {
        let read_txn = self.db.begin_read()?;
        let clicks = read_txn.open_table(TABLE_CLICKS)?;

        let mut counts = Vec::new();
        let mut positions = HashMap::new();
        for entry in clicks.iter()? {
            let (_, value) = entry?;
            let click: ClickEvent = serde_json::from_str(value.value())?;
            tally(&mut counts, &mut positions, &click.hash);
        }

        Ok(counts)
    }

    /// Clicks per client IP, in order of first appearance.
    ///
    /// Only clicks on links that are still registered are counted; an IP
    /// whose clicks all point at deleted links does not appear.
    pub fn click_counts_by_ip(&self) -> Result<Vec<(String, u64)>> {
        let read_txn = self.db.begin_read()?;
        let clicks = read_txn.open_table(TABLE_CLICKS)?;
        let links = read_txn.open_table(TABLE_LINKS)?;

        let mut resolves: HashMap<String, bool> = HashMap::new();
        let mut counts = Vec::new();
        let mut positions = HashMap::new();
        for entry in clicks.iter()? {
            let (_, value) = entry?;
            let click: ClickEvent = serde_json::from_str(value.value())?;

            let live = match resolves.get(&click.hash) {
                Some(live) => *live,
                None => {
                    let live = links.get(click.hash.as_str())?.is_some();
                    resolves.insert(click.hash.clone(), live);
                    live
                }
            };
            if live {
                tally(&mut counts, &mut positions, &click.ip);
            }
        }

        Ok(counts)
    }

    /// Stores `value` under `hash` without any checks.
    #[cfg(test)]
    pub(crate) fn put_raw_link(&self, hash: &str, value: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            links.insert(hash, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
