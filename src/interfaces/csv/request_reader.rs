use crate::domain::request::RawLicenseRequest;
use crate::error::{IssuanceError, Result};
use std::io::Read;

/// Reads license requests from a CSV source.
///
/// Expected headers: `fingerprint,first_name,last_name,title,company,email`.
/// Missing columns and empty cells become absent fields; validation is left
/// to the orchestrator so rejected rows are still audited.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    /// Creates a new `RequestReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes requests.
    pub fn requests(self) -> impl Iterator<Item = Result<RawLicenseRequest>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(IssuanceError::from))
    }
}
