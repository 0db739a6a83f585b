use crate::domain::health::PendingNotification;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads the notification outbox from a CSV source with headers
/// `order_id, kind, created_at`.
pub struct NotificationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> NotificationReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader_builder().from_reader(source),
        }
    }

    pub fn notifications(self) -> impl Iterator<Item = Result<PendingNotification>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
