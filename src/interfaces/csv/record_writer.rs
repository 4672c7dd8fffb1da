use crate::application::orchestrator::IssuedLicense;
use crate::domain::record::IssuanceRecord;
use crate::error::Result;
use std::io::Write;

const RECORD_HEADERS: [&str; 13] = [
    "id",
    "timestamp",
    "status",
    "fingerprint",
    "duration_days",
    "first_name",
    "last_name",
    "title",
    "company",
    "email",
    "license",
    "failure_category",
    "failure_reason",
];

const RESULT_HEADERS: [&str; 5] = ["row", "status", "record_id", "license", "error"];

/// Writes issuance records as CSV, one row per record.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_records(&mut self, records: &[IssuanceRecord]) -> Result<()> {
        self.writer.write_record(RECORD_HEADERS)?;
        for record in records {
            let reason = record.failure_reason();
            self.writer.write_record([
                record.id.to_string().as_str(),
                record.timestamp.to_rfc3339().as_str(),
                record.status().as_str(),
                record.fingerprint.as_str(),
                record.duration_days.to_string().as_str(),
                record.identity.first_name.as_str(),
                record.identity.last_name.as_str(),
                record.identity.title.as_str(),
                record.identity.company.as_str(),
                record.identity.email.as_str(),
                record.license().unwrap_or_default(),
                reason.map(|r| r.category.as_str()).unwrap_or_default(),
                reason.map(|r| r.detail.as_str()).unwrap_or_default(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes one row per batch request. Failures carry the caller-facing
    /// message only.
    pub fn write_results(&mut self, results: &[Result<IssuedLicense>]) -> Result<()> {
        self.writer.write_record(RESULT_HEADERS)?;
        for (row, result) in results.iter().enumerate() {
            let row = (row + 1).to_string();
            match result {
                Ok(issued) => self.writer.write_record([
                    row.as_str(),
                    "issued",
                    issued.record_id.to_string().as_str(),
                    issued.license.as_str(),
                    "",
                ])?,
                Err(err) => self.writer.write_record([
                    row.as_str(),
                    err.category(),
                    "",
                    "",
                    err.to_string().as_str(),
                ])?,
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}
