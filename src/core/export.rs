// Shelver - core/export.rs
//
// CSV and JSON export of transaction-log history.
// Core layer: writes to any Write trait object.

use crate::core::model::OperationRecord;
use crate::util::error::ExportError;
use std::io::Write;
use std::path::Path;

/// Export records to CSV, one row per record.
///
/// Writes: id, timestamp, kind, status, source, destination, source_hash, error
pub fn export_csv<W: Write>(
    records: &[OperationRecord],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    let csv_err = |e: csv::Error| ExportError::Csv {
        path: export_path.to_path_buf(),
        source: e,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record([
            "id",
            "timestamp",
            "kind",
            "status",
            "source",
            "destination",
            "source_hash",
            "error",
        ])
        .map_err(csv_err)?;

    let mut count = 0;
    for record in records {
        let destination = record
            .dest_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        csv_writer
            .write_record([
                &record.id.to_string(),
                &record.timestamp.to_rfc3339(),
                record.kind.label(),
                record.status.label(),
                &record.source_path.display().to_string(),
                &destination,
                record.source_hash.as_deref().unwrap_or(""),
                record.error.as_deref().unwrap_or(""),
            ])
            .map_err(csv_err)?;
        count += 1;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    Ok(count)
}

/// Export records to JSON (array of objects).
pub fn export_json<W: Write>(
    records: &[OperationRecord],
    mut writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    serde_json::to_writer_pretty(&mut writer, records).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{OperationKind, OperationStatus};
    use chrono::Utc;
    use std::path::PathBuf;

    fn make_record(id: u64, status: OperationStatus, error: Option<&str>) -> OperationRecord {
        OperationRecord {
            id,
            timestamp: Utc::now(),
            kind: OperationKind::Move,
            source_path: PathBuf::from(format!("/in/file{id}.txt")),
            dest_path: Some(PathBuf::from(format!("/out/document/file{id}.txt"))),
            source_hash: None,
            status,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_csv_export() {
        let records = vec![
            make_record(1, OperationStatus::Complete, None),
            make_record(2, OperationStatus::Failed, Some("[SourceNotFound] gone")),
        ];
        let mut buf = Vec::new();
        let count = export_csv(&records, &mut buf, Path::new("out.csv")).unwrap();
        assert_eq!(count, 2);

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,timestamp,kind,status"));
        assert!(lines[1].contains("COMPLETE"));
        assert!(lines[2].contains("FAILED"));
        assert!(lines[2].contains("[SourceNotFound] gone"));
    }

    #[test]
    fn test_json_export() {
        let records = vec![make_record(7, OperationStatus::Pending, None)];
        let mut buf = Vec::new();
        let count = export_json(&records, &mut buf, Path::new("out.json")).unwrap();
        assert_eq!(count, 1);

        let parsed: Vec<OperationRecord> = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed[0].id, 7);
        assert_eq!(parsed[0].status, OperationStatus::Pending);
    }
}
