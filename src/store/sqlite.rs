//! SQLite backend.
//!
//! Fingerprints and log ids are stored as text (hex and base64), first-seen
//! timestamps as Unix milliseconds. Duplicate inserts use `INSERT OR IGNORE`
//! and are detected from the affected row count.
//!
//! File databases run in WAL mode. Point reads and writes share one
//! connection; [`StoreBackend::snapshot`] opens its own read-only connection
//! and scans inside a single read transaction, so writers keep going while
//! an export runs.

use crate::base::cterror::CtError;
use crate::ct::loglist::LogId;
use crate::store::backend::{StoreBackend, TableSnapshot};
use crate::store::{CertificateRecord, ChainKey, Fingerprint, FirstSeen, InsertOutcome, StoreCounts};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS certificates (
    fingerprint TEXT NOT NULL,
    is_leaf INTEGER NOT NULL,
    der BLOB NOT NULL,
    origin TEXT NOT NULL,
    first_seen_ms INTEGER NOT NULL,
    PRIMARY KEY (fingerprint, is_leaf)
);
CREATE TABLE IF NOT EXISTS chains (
    leaf TEXT NOT NULL,
    issuers TEXT NOT NULL,
    PRIMARY KEY (leaf, issuers)
);
CREATE INDEX IF NOT EXISTS chains_leaf_idx ON chains (leaf);
CREATE TABLE IF NOT EXISTS verified_logs (
    fingerprint TEXT NOT NULL,
    log_id TEXT NOT NULL,
    PRIMARY KEY (fingerprint, log_id)
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Store tables in a SQLite database.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    /// `None` for in-memory databases, which cannot be opened twice.
    path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CtError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(
            path = %path.display(),
            journal_mode = %mode,
            "sqlite store opened"
        );
        Self::with_connection(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database.
    ///
    /// Snapshots read through the shared connection and hold up writers
    /// for the length of the scan.
    pub fn open_in_memory() -> Result<Self, CtError> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, CtError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read-only connection for long scans.
    fn open_reader(path: &Path) -> Result<Connection, CtError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

fn outcome(changed: usize) -> InsertOutcome {
    if changed == 0 {
        InsertOutcome::AlreadyPresent
    } else {
        InsertOutcome::Inserted
    }
}

fn encode_issuers(issuers: &[Fingerprint]) -> String {
    issuers
        .iter()
        .map(Fingerprint::to_hex)
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_fingerprint(hex: &str) -> Result<Fingerprint, CtError> {
    Fingerprint::from_hex(hex)
        .ok_or_else(|| CtError::storage(format!("corrupt fingerprint {hex:?}")))
}

fn decode_log_id(encoded: &str) -> Result<LogId, CtError> {
    LogId::from_base64(encoded)
        .ok_or_else(|| CtError::storage(format!("corrupt log id {encoded:?}")))
}

fn decode_chain(leaf: &str, issuers: &str) -> Result<ChainKey, CtError> {
    let issuers = if issuers.is_empty() {
        Vec::new()
    } else {
        issuers
            .split(',')
            .map(decode_fingerprint)
            .collect::<Result<_, _>>()?
    };
    Ok(ChainKey::new(decode_fingerprint(leaf)?, issuers))
}

struct CertificateRow {
    fingerprint: String,
    is_leaf: bool,
    der: Vec<u8>,
    origin: String,
    first_seen_ms: i64,
}

impl CertificateRow {
    fn into_record(self) -> Result<CertificateRecord, CtError> {
        Ok(CertificateRecord {
            fingerprint: decode_fingerprint(&self.fingerprint)?,
            der: self.der,
            is_leaf: self.is_leaf,
            first_seen: FirstSeen::from_unix_millis(self.origin, self.first_seen_ms)?,
        })
    }
}

fn certificate_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CertificateRow> {
    Ok(CertificateRow {
        fingerprint: row.get(0)?,
        is_leaf: row.get(1)?,
        der: row.get(2)?,
        origin: row.get(3)?,
        first_seen_ms: row.get(4)?,
    })
}

fn query_chains(conn: &Connection) -> Result<Vec<ChainKey>, CtError> {
    let mut stmt = conn.prepare("SELECT leaf, issuers FROM chains")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut chains = Vec::new();
    for row in rows {
        let (leaf, issuers) = row?;
        chains.push(decode_chain(&leaf, &issuers)?);
    }
    chains.sort();
    Ok(chains)
}

/// Certificates joined with their verified logs, one entry per certificate.
fn query_certificates_with_logs(
    conn: &Connection,
) -> Result<Vec<(CertificateRecord, Option<BTreeSet<LogId>>)>, CtError> {
    let mut stmt = conn.prepare(
        "SELECT c.fingerprint, c.is_leaf, c.der, c.origin, c.first_seen_ms, v.log_id
         FROM certificates c
         LEFT JOIN verified_logs v ON c.is_leaf = 1 AND v.fingerprint = c.fingerprint
         ORDER BY c.fingerprint, c.is_leaf",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((certificate_row(row)?, row.get::<_, Option<String>>(5)?))
    })?;

    let mut certificates: Vec<(CertificateRecord, Option<BTreeSet<LogId>>)> = Vec::new();
    let mut current: Option<(String, bool)> = None;
    for row in rows {
        let (cert, log_id) = row?;
        let key = (cert.fingerprint.clone(), cert.is_leaf);
        if current.as_ref() != Some(&key) {
            certificates.push((cert.into_record()?, None));
            current = Some(key);
        }

        let (Some(encoded), Some((_, logs))) = (log_id, certificates.last_mut()) else {
            continue;
        };
        let logs = logs.get_or_insert_with(BTreeSet::new);
        // The empty marker row records an existing but empty set.
        if !encoded.is_empty() {
            logs.insert(decode_log_id(&encoded)?);
        }
    }
    Ok(certificates)
}

fn read_tables(conn: &mut Connection) -> Result<TableSnapshot, CtError> {
    let tx = conn.transaction()?;
    let certificates = query_certificates_with_logs(&tx)?;
    let chains = query_chains(&tx)?;
    tx.commit()?;
    Ok(TableSnapshot {
        certificates,
        chains,
    })
}

impl StoreBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn insert_certificate(&self, record: &CertificateRecord) -> Result<InsertOutcome, CtError> {
        let changed = self.conn().execute(
            "INSERT OR IGNORE INTO certificates (fingerprint, is_leaf, der, origin, first_seen_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.fingerprint.to_hex(),
                record.is_leaf,
                record.der,
                record.first_seen.origin,
                record.first_seen.unix_millis(),
            ],
        )?;
        Ok(outcome(changed))
    }

    fn certificate(
        &self,
        fingerprint: &Fingerprint,
        is_leaf: bool,
    ) -> Result<Option<CertificateRecord>, CtError> {
        let row = self
            .conn()
            .query_row(
                "SELECT fingerprint, is_leaf, der, origin, first_seen_ms
                 FROM certificates WHERE fingerprint = ?1 AND is_leaf = ?2",
                params![fingerprint.to_hex(), is_leaf],
                certificate_row,
            )
            .optional()?;
        row.map(CertificateRow::into_record).transpose()
    }

    fn certificates(&self) -> Result<Vec<CertificateRecord>, CtError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT fingerprint, is_leaf, der, origin, first_seen_ms
             FROM certificates ORDER BY fingerprint, is_leaf",
        )?;
        let rows = stmt.query_map([], certificate_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    fn insert_chain(&self, chain: &ChainKey) -> Result<InsertOutcome, CtError> {
        let changed = self.conn().execute(
            "INSERT OR IGNORE INTO chains (leaf, issuers) VALUES (?1, ?2)",
            params![chain.leaf.to_hex(), encode_issuers(&chain.issuers)],
        )?;
        Ok(outcome(changed))
    }

    fn chains(&self) -> Result<Vec<ChainKey>, CtError> {
        query_chains(&self.conn())
    }

    fn chains_for_leaf(&self, leaf: &Fingerprint) -> Result<Vec<ChainKey>, CtError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT issuers FROM chains WHERE leaf = ?1")?;
        let rows = stmt.query_map(params![leaf.to_hex()], |row| row.get::<_, String>(0))?;

        let mut chains = Vec::new();
        for issuers in rows {
            chains.push(decode_chain(&leaf.to_hex(), &issuers?)?);
        }
        Ok(chains)
    }

    fn verified_logs(&self, leaf: &Fingerprint) -> Result<Option<BTreeSet<LogId>>, CtError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT log_id FROM verified_logs WHERE fingerprint = ?1")?;
        let rows = stmt.query_map(params![leaf.to_hex()], |row| row.get::<_, String>(0))?;

        let mut logs = BTreeSet::new();
        let mut present = false;
        for encoded in rows {
            let encoded = encoded?;
            present = true;
            // The empty marker row records an existing but empty set.
            if encoded.is_empty() {
                continue;
            }
            logs.insert(decode_log_id(&encoded)?);
        }
        Ok(present.then_some(logs))
    }

    fn put_verified_logs(&self, leaf: &Fingerprint, logs: &BTreeSet<LogId>) -> Result<(), CtError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let fingerprint = leaf.to_hex();

        tx.execute(
            "DELETE FROM verified_logs WHERE fingerprint = ?1",
            params![fingerprint],
        )?;
        {
            let mut insert =
                tx.prepare("INSERT INTO verified_logs (fingerprint, log_id) VALUES (?1, ?2)")?;
            if logs.is_empty() {
                insert.execute(params![fingerprint, ""])?;
            }
            for id in logs {
                insert.execute(params![fingerprint, id.to_base64()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn counts(&self) -> Result<StoreCounts, CtError> {
        let conn = self.conn();
        let certificates: i64 =
            conn.query_row("SELECT COUNT(*) FROM certificates", [], |row| row.get(0))?;
        let chains: i64 = conn.query_row("SELECT COUNT(*) FROM chains", [], |row| row.get(0))?;
        Ok(StoreCounts {
            certificates: certificates as usize,
            chains: chains as usize,
        })
    }

    fn snapshot(&self) -> Result<TableSnapshot, CtError> {
        match &self.path {
            Some(path) => read_tables(&mut Self::open_reader(path)?),
            None => read_tables(&mut self.conn()),
        }
    }
}
