use std::sync::Arc;

use tally_crypto::{operational_entry_hash, HashChainVerifier};
use tally_store::LedgerDatabase;
use tally_types::{ChainHash, Document, LogId, OperationalLogEntry, Timestamp, UserId};
use tracing::debug;

use crate::error::LedgerResult;
use crate::writer::ChainWriter;

/// Appends operational events to their own hash chain.
///
/// No staging and no device: one read-head/compute/append step on the
/// operational chain writer. Storage failures are returned directly.
pub struct OperationalLogger {
    db: Arc<dyn LedgerDatabase>,
    writer: ChainWriter,
}

impl OperationalLogger {
    pub fn new(db: Arc<dyn LedgerDatabase>, writer: ChainWriter) -> Self {
        Self { db, writer }
    }

    pub async fn log_operational_event(
        &self,
        event_type: &str,
        user_id: Option<UserId>,
        details: Document,
    ) -> LedgerResult<OperationalLogEntry> {
        let db = Arc::clone(&self.db);
        let event_type = event_type.to_string();
        self.writer
            .submit(move || append(&*db, event_type, user_id, details))
            .await
    }
}

fn append(
    db: &dyn LedgerDatabase,
    event_type: String,
    user_id: Option<UserId>,
    details: Document,
) -> LedgerResult<OperationalLogEntry> {
    let head = db.last_operational_entry()?;
    let mut entry = OperationalLogEntry {
        sequence: head.as_ref().map_or(1, |h| h.sequence + 1),
        log_id: LogId::new(),
        timestamp_utc: Timestamp::now(),
        event_type,
        user_id,
        details,
        previous_log_hash: HashChainVerifier::next_previous_hash(head.as_ref()),
        current_log_hash: ChainHash::GENESIS,
    };
    entry.current_log_hash = operational_entry_hash(&entry);

    db.append_operational_entry(&entry)?;
    debug!(
        sequence = entry.sequence,
        event_type = %entry.event_type,
        "operational event logged"
    );
    Ok(entry)
}
