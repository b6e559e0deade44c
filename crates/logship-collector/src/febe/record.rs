//! Decoding of structured log records from frame payloads.

use std::fmt;

use bytes::{Buf, Bytes};
use thiserror::Error;

use crate::febe::codec::{self, FrameError};

/// One structured log record, fields in wire order. Nullable strings carry a
/// leading control byte on the wire: `'P'` (present, C-string follows) or
/// `'N'` (null, followed by a discarded NUL).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRecord {
    pub log_time: String,
    pub user_name: Option<String>,
    pub database_name: Option<String>,
    pub pid: i32,
    pub client_addr: Option<String>,
    pub session_id: String,
    pub seq_num: i64,
    pub ps_display: Option<String>,
    pub session_start: String,
    pub vxid: Option<String>,
    pub txid: u64,
    pub e_level: i32,
    pub sql_state: Option<String>,
    pub err_message: Option<String>,
    pub err_detail: Option<String>,
    pub err_hint: Option<String>,
    pub internal_query: Option<String>,
    pub internal_query_pos: i32,
    pub err_context: Option<String>,
    pub user_query: Option<String>,
    pub user_query_pos: i32,
    pub file_err_pos: Option<String>,
    pub application_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("expected nullable string control character, got {0:#04x}")]
    BadControl(u8),
    /// The length header and the field contents disagree.
    #[error("log record has {0} bytes left over after its last field")]
    TrailingBytes(usize),
}

fn next_nullable(buf: &mut Bytes) -> Result<Option<String>, RecordError> {
    if !buf.has_remaining() {
        return Err(FrameError::Truncated.into());
    }

    match buf.get_u8() {
        b'P' => Ok(Some(codec::read_cstring(buf)?)),
        // 'N' is still followed by a NUL byte that must be consumed.
        b'N' => {
            codec::read_cstring(buf)?;
            Ok(None)
        }
        other => Err(RecordError::BadControl(other)),
    }
}

/// Decode one record from a frame payload. The payload must be consumed
/// exactly: leftover bytes mean the length header and contents disagree.
pub fn parse_log_record(payload: Bytes) -> Result<LogRecord, RecordError> {
    let mut buf = payload;

    let record = LogRecord {
        log_time: codec::read_cstring(&mut buf)?,
        user_name: next_nullable(&mut buf)?,
        database_name: next_nullable(&mut buf)?,
        pid: codec::read_i32(&mut buf)?,
        client_addr: next_nullable(&mut buf)?,
        session_id: codec::read_cstring(&mut buf)?,
        seq_num: codec::read_i64(&mut buf)?,
        ps_display: next_nullable(&mut buf)?,
        session_start: codec::read_cstring(&mut buf)?,
        vxid: next_nullable(&mut buf)?,
        txid: codec::read_u64(&mut buf)?,
        e_level: codec::read_i32(&mut buf)?,
        sql_state: next_nullable(&mut buf)?,
        err_message: next_nullable(&mut buf)?,
        err_detail: next_nullable(&mut buf)?,
        err_hint: next_nullable(&mut buf)?,
        internal_query: next_nullable(&mut buf)?,
        internal_query_pos: codec::read_i32(&mut buf)?,
        err_context: next_nullable(&mut buf)?,
        user_query: next_nullable(&mut buf)?,
        user_query_pos: codec::read_i32(&mut buf)?,
        file_err_pos: next_nullable(&mut buf)?,
        application_name: next_nullable(&mut buf)?,
    };

    if buf.has_remaining() {
        return Err(RecordError::TrailingBytes(buf.remaining()));
    }

    Ok(record)
}

impl LogRecord {
    /// Wire encoding, the inverse of [`parse_log_record`]. Used by loopback
    /// tooling and tests; the collector itself only decodes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        let string = |buf: &mut Vec<u8>, s: &str| codec::write_cstring(buf, s);
        let nullable = |buf: &mut Vec<u8>, s: &Option<String>| match s {
            Some(v) => {
                buf.push(b'P');
                codec::write_cstring(buf, v);
            }
            None => {
                buf.push(b'N');
                buf.push(0);
            }
        };

        string(&mut buf, &self.log_time);
        nullable(&mut buf, &self.user_name);
        nullable(&mut buf, &self.database_name);
        buf.extend_from_slice(&self.pid.to_be_bytes());
        nullable(&mut buf, &self.client_addr);
        string(&mut buf, &self.session_id);
        buf.extend_from_slice(&self.seq_num.to_be_bytes());
        nullable(&mut buf, &self.ps_display);
        string(&mut buf, &self.session_start);
        nullable(&mut buf, &self.vxid);
        buf.extend_from_slice(&self.txid.to_be_bytes());
        buf.extend_from_slice(&self.e_level.to_be_bytes());
        nullable(&mut buf, &self.sql_state);
        nullable(&mut buf, &self.err_message);
        nullable(&mut buf, &self.err_detail);
        nullable(&mut buf, &self.err_hint);
        nullable(&mut buf, &self.internal_query);
        buf.extend_from_slice(&self.internal_query_pos.to_be_bytes());
        nullable(&mut buf, &self.err_context);
        nullable(&mut buf, &self.user_query);
        buf.extend_from_slice(&self.user_query_pos.to_be_bytes());
        nullable(&mut buf, &self.file_err_pos);
        nullable(&mut buf, &self.application_name);

        buf
    }
}

/// One-record-per-line rendering for diagnostics.
impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn ns(field: &Option<String>) -> String {
            match field {
                Some(v) => format!("[{v:?}]"),
                None => "NULL".to_string(),
            }
        }

        write!(
            f,
            "LogTime={:?} UserName={} DatabaseName={} Pid={} ClientAddr={} \
             SessionId={:?} SeqNum={} PsDisplay={} SessionStart={:?} Vxid={} \
             Txid={} ELevel={} SQLState={} ErrMessage={} ErrDetail={} \
             ErrHint={} InternalQuery={} InternalQueryPos={} ErrContext={} \
             UserQuery={} UserQueryPos={} FileErrPos={} ApplicationName={}",
            self.log_time,
            ns(&self.user_name),
            ns(&self.database_name),
            self.pid,
            ns(&self.client_addr),
            self.session_id,
            self.seq_num,
            ns(&self.ps_display),
            self.session_start,
            ns(&self.vxid),
            self.txid,
            self.e_level,
            ns(&self.sql_state),
            ns(&self.err_message),
            ns(&self.err_detail),
            ns(&self.err_hint),
            ns(&self.internal_query),
            self.internal_query_pos,
            ns(&self.err_context),
            ns(&self.user_query),
            self.user_query_pos,
            ns(&self.file_err_pos),
            ns(&self.application_name),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> LogRecord {
        LogRecord {
            log_time: "2015-04-07 12:30:00 UTC".to_string(),
            user_name: Some("alice".to_string()),
            database_name: None,
            pid: 4221,
            client_addr: Some("10.0.0.1:5432".to_string()),
            session_id: "5524e1b9.107d".to_string(),
            seq_num: 42,
            ps_display: None,
            session_start: "2015-04-07 12:00:00 UTC".to_string(),
            vxid: Some("3/17".to_string()),
            txid: 9000,
            e_level: 20,
            sql_state: Some("XX000".to_string()),
            err_message: Some("index corrupted".to_string()),
            err_detail: Some("block 17".to_string()),
            err_hint: None,
            internal_query: None,
            internal_query_pos: -1,
            err_context: None,
            user_query: Some("SELECT 1".to_string()),
            user_query_pos: 3,
            file_err_pos: None,
            application_name: Some("psql".to_string()),
        }
    }

    #[test]
    fn test_round_trip() {
        let record = sample_record();
        let decoded = parse_log_record(Bytes::from(record.encode())).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_round_trip_all_null() {
        let record = LogRecord::default();
        let decoded = parse_log_record(Bytes::from(record.encode())).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut wire = sample_record().encode();
        wire.push(0);

        match parse_log_record(Bytes::from(wire)) {
            Err(RecordError::TrailingBytes(1)) => {}
            other => panic!("expected TrailingBytes(1), got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let wire = sample_record().encode();
        let cut = Bytes::from(wire[..wire.len() / 2].to_vec());
        assert!(parse_log_record(cut).is_err());
    }

    #[test]
    fn test_bad_nullable_control_byte() {
        // Corrupt the control byte of UserName, the first nullable field.
        let record = sample_record();
        let mut wire = record.encode();
        let pos = record.log_time.len() + 1;
        assert_eq!(wire[pos], b'P');
        wire[pos] = b'X';

        match parse_log_record(Bytes::from(wire)) {
            Err(RecordError::BadControl(b'X')) => {}
            other => panic!("expected BadControl, got {other:?}"),
        }
    }

    #[test]
    fn test_one_line_display() {
        let line = sample_record().to_string();
        assert!(line.contains("ErrMessage=[\"index corrupted\"]"));
        assert!(line.contains("ErrHint=NULL"));
        assert!(line.contains("Pid=4221"));
        assert!(!line.contains('\n'));
    }
}
