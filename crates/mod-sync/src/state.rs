use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use mailshelter_domain::Mail;
use mailshelter_error::ShelterError;
use tracing::info;

/// The two pieces of durable run state: HEAD, the received time of the newest
/// fully committed mail, and INDEX, the set of committed mail ids. Loaded
/// once at run start, advanced by [`SyncState::finalize`], written back once
/// at run end. Owned exclusively by a single run.
pub struct SyncState {
    head_path: PathBuf,
    index_path: PathBuf,
    head: DateTime<Utc>,
    index: HashSet<String>,
}

impl SyncState {
    /// Missing files are not an error: HEAD defaults to the service genesis,
    /// INDEX to empty. A present-but-malformed file is.
    pub fn load(
        head_path: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        genesis: DateTime<Utc>,
    ) -> Result<Self, ShelterError> {
        let head_path = head_path.into();
        let index_path = index_path.into();

        let head = match fs::read(&head_path) {
            Ok(bytes) => decode_head(&bytes).ok_or_else(|| {
                ShelterError::storage(format!(
                    "{}: not a valid HEAD file ({} bytes)",
                    head_path.display(),
                    bytes.len()
                ))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => genesis,
            Err(e) => {
                return Err(ShelterError::storage(format!(
                    "read {}: {e}",
                    head_path.display()
                )))
            }
        };

        let index = match fs::read(&index_path) {
            Ok(bytes) => {
                let ids: Vec<String> = serde_json::from_slice(&bytes).map_err(|e| {
                    ShelterError::storage(format!(
                        "{}: not a valid INDEX file: {e}",
                        index_path.display()
                    ))
                })?;
                ids.into_iter().collect()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                return Err(ShelterError::storage(format!(
                    "read {}: {e}",
                    index_path.display()
                )))
            }
        };

        Ok(Self {
            head_path,
            index_path,
            head,
            index,
        })
    }

    pub fn head(&self) -> DateTime<Utc> {
        self.head
    }

    pub fn contains(&self, mail_id: &str) -> bool {
        self.index.contains(mail_id)
    }

    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Commit the longest done prefix of the oldest-first mail list: walk the
    /// list in order, advance HEAD and extend INDEX while each mail is done,
    /// stop at the first that is not. Completion order under concurrency does
    /// not matter; only this prefix is ever reflected in durable state.
    /// Returns how many mails were committed.
    pub fn finalize(&mut self, mails: &[Mail], done: &HashSet<String>) -> usize {
        let mut committed = 0;
        for mail in mails {
            if !done.contains(&mail.id) {
                break;
            }
            let received = mail.received_utc();
            if received > self.head {
                self.head = received;
            }
            self.index.insert(mail.id.clone());
            committed += 1;
        }
        committed
    }

    /// Flush HEAD and INDEX to disk. Called exactly once per run, on every
    /// exit path.
    pub fn store(&self) -> Result<(), ShelterError> {
        fs::write(&self.head_path, encode_head(self.head)).map_err(|e| {
            ShelterError::storage(format!("write {}: {e}", self.head_path.display()))
        })?;

        let mut ids: Vec<&String> = self.index.iter().collect();
        ids.sort();
        let bytes = serde_json::to_vec(&ids)
            .map_err(|e| ShelterError::storage(format!("encode INDEX: {e}")))?;
        fs::write(&self.index_path, bytes).map_err(|e| {
            ShelterError::storage(format!("write {}: {e}", self.index_path.display()))
        })?;

        info!(head = %self.head.to_rfc3339(), indexed = self.index.len(), "state stored");
        Ok(())
    }
}

/// HEAD is a fixed-width 8-byte little-endian unsigned Unix timestamp.
fn encode_head(head: DateTime<Utc>) -> [u8; 8] {
    (head.timestamp().max(0) as u64).to_le_bytes()
}

fn decode_head(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    let secs = i64::try_from(u64::from_le_bytes(raw)).ok()?;
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mailshelter_domain::Member;

    fn genesis() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 6, 26, 0, 0, 0).single().unwrap()
    }

    fn mail(id: &str, received: &str) -> Mail {
        Mail {
            member: Member {
                id: 1,
                name: "A".into(),
                image_url: String::new(),
            },
            id: id.into(),
            subject: "s".into(),
            content: String::new(),
            received: DateTime::parse_from_rfc3339(received).unwrap(),
            detail_url: "https://app.example.com/mail/x".into(),
        }
    }

    #[test]
    fn defaults_to_genesis_when_files_absent() {
        let dir = tempfile::tempdir().unwrap();
        let state = SyncState::load(dir.path().join("HEAD"), dir.path().join("INDEX"), genesis())
            .unwrap();
        assert_eq!(state.head(), genesis());
        assert_eq!(state.index_len(), 0);
    }

    #[test]
    fn head_and_index_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let head_path = dir.path().join("HEAD");
        let index_path = dir.path().join("INDEX");

        let mut state = SyncState::load(&head_path, &index_path, genesis()).unwrap();
        let mails = vec![
            mail("a1", "2021-05-01T10:00:00+09:00"),
            mail("a2", "2021-05-02T10:00:00+09:00"),
        ];
        let done: HashSet<String> = ["a1", "a2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(state.finalize(&mails, &done), 2);
        state.store().unwrap();

        assert_eq!(fs::read(&head_path).unwrap().len(), 8);
        let reloaded = SyncState::load(&head_path, &index_path, genesis()).unwrap();
        assert_eq!(reloaded.head(), mails[1].received_utc());
        assert!(reloaded.contains("a1"));
        assert!(reloaded.contains("a2"));
        assert!(!reloaded.contains("a3"));
    }

    #[test]
    fn malformed_head_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let head_path = dir.path().join("HEAD");
        fs::write(&head_path, b"short").unwrap();
        let err = SyncState::load(&head_path, dir.path().join("INDEX"), genesis())
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("HEAD"), "{err}");
    }

    #[test]
    fn finalize_stops_at_first_gap() {
        let dir = tempfile::tempdir().unwrap();
        let mut state =
            SyncState::load(dir.path().join("HEAD"), dir.path().join("INDEX"), genesis())
                .unwrap();
        let mails = vec![
            mail("a1", "2021-05-01T10:00:00+09:00"),
            mail("a2", "2021-05-02T10:00:00+09:00"),
            mail("a3", "2021-05-03T10:00:00+09:00"),
        ];
        // a2 missing: only a1 may be committed even though a3 finished.
        let done: HashSet<String> = ["a1", "a3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(state.finalize(&mails, &done), 1);
        assert_eq!(state.head(), mails[0].received_utc());
        assert!(state.contains("a1"));
        assert!(!state.contains("a3"));
    }

    #[test]
    fn head_never_moves_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let mut state =
            SyncState::load(dir.path().join("HEAD"), dir.path().join("INDEX"), genesis())
                .unwrap();
        let mails = vec![
            mail("m9", "2021-05-10T10:00:00+09:00"),
            // birthday mail timestamped before the ordinary stream
            mail("bm3", "2021-05-04T00:00:00+09:00"),
        ];
        let done: HashSet<String> = ["m9", "bm3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(state.finalize(&mails, &done), 2);
        assert_eq!(state.head(), mails[0].received_utc());
        assert!(state.contains("bm3"));
    }

    #[test]
    fn finalize_with_empty_done_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut state =
            SyncState::load(dir.path().join("HEAD"), dir.path().join("INDEX"), genesis())
                .unwrap();
        let mails = vec![mail("a1", "2021-05-01T10:00:00+09:00")];
        assert_eq!(state.finalize(&mails, &HashSet::new()), 0);
        assert_eq!(state.head(), genesis());
    }
}
