use crate::domain::order::OrderAggregate;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads order aggregates from a CSV source.
///
/// Required headers are `id, payment_status, status`; `paid_at` and the
/// denormalized columns are optional.
pub struct OrderReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OrderReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader_builder().from_reader(source),
        }
    }

    pub fn orders(self) -> impl Iterator<Item = Result<OrderAggregate>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
