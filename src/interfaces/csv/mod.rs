//! CSV import of order aggregates, ledger rows and the notification outbox,
//! and CSV export of views.

pub mod notification_reader;
pub mod order_reader;
pub mod status_writer;
pub mod transaction_reader;

pub(crate) fn reader_builder() -> ::csv::ReaderBuilder {
    let mut builder = ::csv::ReaderBuilder::new();
    builder.trim(::csv::Trim::All).flexible(true);
    builder
}
