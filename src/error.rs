use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    /// A remote call could not be completed. Triggers the fallback chain.
    #[error("Network error: {0}")]
    Network(String),
    /// A record was missing or malformed.
    #[error("Data error: {0}")]
    Data(String),
    /// The repair action failed or reported failure.
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),
}

pub type Result<T> = std::result::Result<T, PaymentError>;
