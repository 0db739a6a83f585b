use crate::domain::transaction::TransactionRecord;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads ledger rows from a CSV source.
///
/// Expected headers: `order_id, status, paid_at, channel, provider_reference,
/// amount, created_at`. Timestamps are RFC 3339; optional columns may be
/// empty or omitted.
pub struct TransactionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> TransactionReader<R> {
    /// Creates a new `TransactionReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader_builder().from_reader(source),
        }
    }

    /// Returns an iterator that lazily reads and deserializes ledger rows.
    pub fn transactions(self) -> impl Iterator<Item = Result<TransactionRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
