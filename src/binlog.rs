//! Binary-framed log writers: `delete_log` (fixed fields + variable file
//! name) and `production_log` (length-prefixed text record). Unlike the
//! text log families these are consumed by machine readers (statistics
//! tools), so framing is exact rather than tracing-formatted.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Reason codes for a `delete_log` record. Only the subset referenced by
/// the component design and its testable scenarios is modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReason {
    AgeInput,
    OtherDel,
    HostDisabled,
}

impl DeleteReason {
    fn code(self) -> u32 {
        match self {
            DeleteReason::AgeInput => 0x01,
            DeleteReason::OtherDel => 0x02,
            DeleteReason::HostDisabled => 0x03,
        }
    }

    fn trailer_tag(self) -> &'static str {
        match self {
            DeleteReason::AgeInput => "dir_check",
            DeleteReason::OtherDel => "other_del",
            DeleteReason::HostDisabled => "host_disabled",
        }
    }
}

pub struct DeleteLogRecord {
    pub file_size: u64,
    pub dir_id: u32,
    pub job_id: u32,
    pub input_time: u64,
    pub split_job_counter: u32,
    pub unique_number: u32,
    pub file_name: String,
    pub reason: DeleteReason,
    pub age_limit_secs: Option<u64>,
}

/// Append one record in the fixed layout described by §4.10: size fields,
/// then the variable file name, then a reason code and free-form trailer.
pub fn write_delete_log(path: &Path, record: &DeleteLogRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    let name_bytes = record.file_name.as_bytes();
    f.write_all(&record.file_size.to_le_bytes())?;
    f.write_all(&record.dir_id.to_le_bytes())?;
    f.write_all(&record.job_id.to_le_bytes())?;
    f.write_all(&record.input_time.to_le_bytes())?;
    f.write_all(&record.split_job_counter.to_le_bytes())?;
    f.write_all(&record.unique_number.to_le_bytes())?;
    f.write_all(&(name_bytes.len() as u32).to_le_bytes())?;
    f.write_all(name_bytes)?;
    f.write_all(&record.reason.code().to_le_bytes())?;
    let trailer = match (record.reason, record.age_limit_secs) {
        (DeleteReason::AgeInput, Some(limit)) => {
            format!("{}>{}", record.reason.trailer_tag(), limit)
        }
        _ => record.reason.trailer_tag().to_string(),
    };
    let trailer_bytes = trailer.as_bytes();
    f.write_all(&(trailer_bytes.len() as u32).to_le_bytes())?;
    f.write_all(trailer_bytes)?;
    Ok(())
}

/// Production-log record: ratio (files produced per file consumed),
/// creation-time/unique/split triple, dir/job ids, names and the command
/// that produced the new file (empty for a straight copy/rename).
pub struct ProductionLogRecord {
    pub ratio_produced: u32,
    pub ratio_consumed: u32,
    pub ctime: u64,
    pub unique_number: u32,
    pub split_job_counter: u32,
    pub dir_id: u32,
    pub job_id: u32,
    pub orig_name: String,
    pub new_name: String,
    pub command: String,
}

/// Writes a `<2-byte length><payload>\n` record, where the length prefixes
/// the *total* record length including the 2-byte prefix itself — see
/// DESIGN.md's resolution of the ambiguous original framing.
pub fn write_production_log(path: &Path, record: &ProductionLogRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let payload = format!(
        "{}:{}|{}_{}_{}|{}|{}|{}|{}|{}\n",
        record.ratio_produced,
        record.ratio_consumed,
        record.ctime,
        record.unique_number,
        record.split_job_counter,
        record.dir_id,
        record.job_id,
        record.orig_name,
        record.new_name,
        record.command,
    );
    let total_len = (payload.len() + 2) as u16;
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(&total_len.to_le_bytes())?;
    f.write_all(payload.as_bytes())?;
    Ok(())
}

/// Parses records back out of a production_log file, honoring the
/// total-length-including-prefix convention.
pub fn read_production_log(bytes: &[u8]) -> Vec<String> {
    let mut records = Vec::new();
    let mut offset = 0usize;
    while offset + 2 <= bytes.len() {
        let total_len = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]) as usize;
        if total_len < 2 || offset + total_len > bytes.len() {
            break;
        }
        let payload = &bytes[offset + 2..offset + total_len];
        records.push(String::from_utf8_lossy(payload).trim_end().to_string());
        offset += total_len;
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_log_round_trip_sizes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("delete_log");
        let record = DeleteLogRecord {
            file_size: 1234,
            dir_id: 1,
            job_id: 2,
            input_time: 1000,
            split_job_counter: 0,
            unique_number: 7,
            file_name: "f.txt".to_string(),
            reason: DeleteReason::AgeInput,
            age_limit_secs: Some(60),
        };
        write_delete_log(&path, &record).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.len() > record.file_name.len());
    }

    #[test]
    fn production_log_length_prefix_includes_itself() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("production_log");
        let record = ProductionLogRecord {
            ratio_produced: 1,
            ratio_consumed: 1,
            ctime: 100,
            unique_number: 1,
            split_job_counter: 0,
            dir_id: 1,
            job_id: 1,
            orig_name: "a".to_string(),
            new_name: "b".to_string(),
            command: String::new(),
        };
        write_production_log(&path, &record).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let declared_len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        assert_eq!(declared_len, bytes.len());
        let records = read_production_log(&bytes);
        assert_eq!(records.len(), 1);
    }
}
