//! Local artifact writer.
//!
//! Output is deterministic: the same records always produce the same bytes,
//! so unchanged data never looks changed to the remote checksum either.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::app::Result;
use crate::domain::{ArtifactFormat, Record, TargetSpec};

const MAX_STEM_LEN: usize = 80;

pub struct LocalWriter {
    root: PathBuf,
}

impl LocalWriter {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn target_dir(&self, target: &str) -> PathBuf {
        self.root.join(target)
    }

    pub fn record_path(&self, target: &TargetSpec, identity: &str) -> PathBuf {
        self.target_dir(&target.name)
            .join(artifact_name(&target.name, identity, target.format))
    }

    /// Write one record to its own artifact, replacing any previous one.
    pub fn write_record(&self, target: &TargetSpec, record: &Record) -> Result<PathBuf> {
        let path = self.record_path(target, &record.identity);
        let records = std::slice::from_ref(record);
        let bytes = match target.format {
            ArtifactFormat::Json => render_json(records)?,
            ArtifactFormat::Csv => render_csv(&target.csv_header(), records)?,
        };
        write_atomic(&path, &bytes)?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Every record artifact of a JSON target, ordered by identity.
    pub fn load_records(&self, target: &TargetSpec) -> Result<Vec<Record>> {
        let dir = self.target_dir(&target.name);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}-", target.name);
        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix));
            if !is_record {
                continue;
            }
            let batch: Vec<Record> = serde_json::from_slice(&fs::read(&path)?)?;
            records.extend(batch);
        }
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(records)
    }

    /// Paths of the combined `<target>.json` and `<target>.csv`.
    pub fn rollup_paths(&self, target: &TargetSpec) -> [PathBuf; 2] {
        [
            self.root.join(format!("{}.json", target.name)),
            self.root.join(format!("{}.csv", target.name)),
        ]
    }

    /// Rebuild both rollup files from all record artifacts.
    pub fn write_rollup(&self, target: &TargetSpec) -> Result<Vec<PathBuf>> {
        let records = self.load_records(target)?;
        let [json_path, csv_path] = self.rollup_paths(target);

        write_atomic(&json_path, &render_json(&records)?)?;
        write_atomic(&csv_path, &render_csv(&target.csv_header(), &records)?)?;

        debug!("Rolled up {} records for {}", records.len(), target.name);
        Ok(vec![json_path, csv_path])
    }
}

/// File name for a record artifact. Identities that are not already
/// filename-safe get a short digest suffix so distinct identities never
/// collide after sanitizing.
pub fn artifact_name(target: &str, identity: &str, format: ArtifactFormat) -> String {
    let mut stem: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();

    if stem != identity {
        let digest = hex::encode(Sha256::digest(identity.as_bytes()));
        stem.push('-');
        stem.push_str(&digest[..8]);
    }

    format!("{}-{}.{}", target, stem, format.extension())
}

pub fn render_json(records: &[Record]) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(records)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn render_csv(header: &[String], records: &[Record]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header)?;

    for record in records {
        let row: Vec<String> = header
            .iter()
            .map(|column| match column.as_str() {
                "identity" => record.identity.clone(),
                "source_url" => record.source_url.clone(),
                "last_seen" => record.last_seen.to_rfc3339(),
                name => record.field(name).to_cell(),
            })
            .collect();
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()).into())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DetailSpec, FetchMode, FieldRule, FieldValue, Fields, IdentityRule, ListingSpec,
    };
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn target(format: ArtifactFormat) -> TargetSpec {
        TargetSpec {
            name: "judges".into(),
            listing: ListingSpec::Html {
                url: "https://example.com/".into(),
                mode: FetchMode::Http,
                anchor: ".item".into(),
                link: "a".into(),
                base_url: None,
                fields: vec![],
            },
            detail: DetailSpec {
                mode: FetchMode::Http,
                anchor: None,
                fields: vec![
                    FieldRule::text("judge_name", "h1"),
                    FieldRule::rows(
                        "appointments",
                        "tr",
                        vec![FieldRule::text("date", ".d"), FieldRule::text("club", ".c")],
                    ),
                ],
                derived: vec![],
            },
            identity: IdentityRule::Query {
                param: "JudgeId".into(),
            },
            format,
            rollup: true,
        }
    }

    fn record(identity: &str, name: &str) -> Record {
        let mut row = Fields::new();
        row.insert("date".into(), FieldValue::Text("2021-05-01".into()));
        row.insert("club".into(), FieldValue::Text("Leeds, CS".into()));

        let mut fields = Fields::new();
        fields.insert("judge_name".into(), FieldValue::Text(name.into()));
        fields.insert("appointments".into(), FieldValue::Rows(vec![row]));

        let mut record = Record::new(
            identity.into(),
            format!("https://example.com/j?JudgeId={}", identity),
            fields,
        )
        .unwrap();
        record.last_seen = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        record
    }

    #[test]
    fn test_render_is_idempotent() {
        let records = vec![record("1", "Ann"), record("2", "Bob")];
        assert_eq!(render_json(&records).unwrap(), render_json(&records).unwrap());

        let header = target(ArtifactFormat::Csv).csv_header();
        assert_eq!(
            render_csv(&header, &records).unwrap(),
            render_csv(&header, &records).unwrap()
        );
    }

    #[test]
    fn test_write_twice_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let writer = LocalWriter::new(dir.path());
        let target = target(ArtifactFormat::Json);
        let record = record("1", "Ann");

        let path = writer.write_record(&target, &record).unwrap();
        let first = fs::read(&path).unwrap();
        writer.write_record(&target, &record).unwrap();
        assert_eq!(first, fs::read(&path).unwrap());
        assert_eq!(path, dir.path().join("judges").join("judges-1.json"));
    }

    #[test]
    fn test_csv_layout() {
        let header = target(ArtifactFormat::Csv).csv_header();
        let bytes = render_csv(&header, &[record("1", "Ann")]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("identity,source_url,judge_name,appointments,last_seen")
        );
        assert_eq!(
            lines.next(),
            Some("1,https://example.com/j?JudgeId=1,Ann,\"Leeds, CS / 2021-05-01\",2024-01-02T03:04:05+00:00")
        );
    }

    #[test]
    fn test_artifact_name_sanitizes() {
        assert_eq!(
            artifact_name("judges", "4711", ArtifactFormat::Json),
            "judges-4711.json"
        );
        let a = artifact_name("archive", "https://a/b?id=1", ArtifactFormat::Csv);
        let b = artifact_name("archive", "https://a/b?id=2", ArtifactFormat::Csv);
        assert!(a.starts_with("archive-https___a_b_id_1-"));
        assert!(a.ends_with(".csv"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_rollup_combines_records() {
        let dir = TempDir::new().unwrap();
        let writer = LocalWriter::new(dir.path());
        let target = target(ArtifactFormat::Json);

        writer.write_record(&target, &record("2", "Bob")).unwrap();
        writer.write_record(&target, &record("1", "Ann")).unwrap();

        let paths = writer.write_rollup(&target).unwrap();
        assert_eq!(paths[0], dir.path().join("judges.json"));

        let combined: Vec<Record> =
            serde_json::from_slice(&fs::read(&paths[0]).unwrap()).unwrap();
        let ids: Vec<&str> = combined.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        let csv = fs::read_to_string(&paths[1]).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }
}
