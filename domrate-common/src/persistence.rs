//! Durable store for domains, requests, module outputs, module versions and
//! the error log, exposed as a key-value-like trait rather than a SQL schema.
//!
//! The shipped implementation ([`JsonlPersistence`]) keeps everything in
//! memory behind a single [`std::sync::Mutex`] and appends every mutation to
//! a JSONL journal file. On startup the journal is replayed to rebuild the
//! in-memory indexes; a line that fails to parse (a process killed
//! mid-write) is skipped with a logged warning rather than treated as fatal,
//! the same tolerance [`crate::queue::QueueStore::restore`] applies to its
//! own snapshot format.

use crate::types::{Access, Domain, ErrorRecord, ModuleRecord, ModuleVersion, Request, RequestState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("persistence journal io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("persistence journal serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("domain '{0}' was not found")]
    DomainNotFound(String),
    #[error("request {0} was not found")]
    RequestNotFound(u64),
}

/// One mutation recorded in the journal, replayed in order to rebuild state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    InsertDomain { id: u64, name: String, updated_at: DateTime<Utc> },
    UpdateDomain { name: String, state: Access, comment: Option<String>, updated_at: DateTime<Utc> },
    InsertRequest { id: u64, domain_id: u64, created_at: DateTime<Utc> },
    UpdateRequest { id: u64, state: RequestState, comment: Option<String> },
    InsertModuleRecord { request_id: u64, module: String, payload: serde_json::Value },
    SetModuleVersion { module: String, version: u64, updated_at: DateTime<Utc> },
    InsertError { request_id: u64, module: String, comment: String, created_at: DateTime<Utc> },
}

/// Public persistence interface. A trait rather than a concrete type, so
/// components depend on the contract, not the storage substrate.
pub trait Persistence: Send + Sync {
    fn insert_domain(&self, name: &str) -> Result<u64, PersistenceError>;
    fn update_domain(
        &self,
        name: &str,
        state: Access,
        comment: Option<String>,
    ) -> Result<(), PersistenceError>;
    fn find_domain(&self, name: &str) -> Result<Option<Domain>, PersistenceError>;
    fn insert_request(&self, domain_id: u64) -> Result<u64, PersistenceError>;
    fn latest_request_for(&self, domain_id: u64) -> Result<Option<Request>, PersistenceError>;
    fn update_request(
        &self,
        id: u64,
        state: RequestState,
        comment: Option<String>,
    ) -> Result<(), PersistenceError>;
    /// Join check: does `request_id` reference a domain named exactly `domain_name`?
    fn is_request_valid(&self, request_id: u64, domain_name: &str) -> Result<bool, PersistenceError>;
    fn insert_module_record(
        &self,
        request_id: u64,
        module: &str,
        payload: serde_json::Value,
    ) -> Result<(), PersistenceError>;
    fn get_module_version(&self, module: &str) -> Result<Option<u64>, PersistenceError>;
    fn set_module_version(&self, module: &str, version: u64) -> Result<(), PersistenceError>;
    fn insert_error(
        &self,
        request_id: u64,
        module: &str,
        comment: &str,
    ) -> Result<(), PersistenceError>;
    fn module_records_for(&self, request_id: u64) -> Result<Vec<ModuleRecord>, PersistenceError>;
    fn errors_for(&self, request_id: u64) -> Result<Vec<ErrorRecord>, PersistenceError>;
    fn get_request(&self, id: u64) -> Result<Option<Request>, PersistenceError>;
}

#[derive(Default)]
struct State {
    domains_by_name: HashMap<String, Domain>,
    domains_by_id: HashMap<u64, String>,
    requests: HashMap<u64, Request>,
    requests_by_domain: HashMap<u64, Vec<u64>>,
    module_records: HashMap<u64, Vec<ModuleRecord>>,
    module_versions: HashMap<String, ModuleVersion>,
    errors: HashMap<u64, Vec<ErrorRecord>>,
    next_domain_id: u64,
    next_request_id: u64,
}

/// In-process, JSONL-journaled implementation of [`Persistence`].
pub struct JsonlPersistence {
    state: Mutex<State>,
    journal: Mutex<File>,
    #[allow(dead_code)]
    journal_path: PathBuf,
}

impl JsonlPersistence {
    /// Open (creating if absent) the journal at `path`, replaying any
    /// existing entries to rebuild the in-memory indexes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let mut state = State::default();

        if path.exists() {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JournalEntry>(&line) {
                    Ok(entry) => apply_entry(&mut state, entry),
                    Err(e) => {
                        warn!(
                            journal = %path.display(),
                            line = line_no + 1,
                            error = %e,
                            "skipping unparseable journal line"
                        );
                    }
                }
            }
        }

        let journal = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            state: Mutex::new(state),
            journal: Mutex::new(journal),
            journal_path: path,
        })
    }

    fn append(&self, entry: &JournalEntry) -> Result<(), PersistenceError> {
        let line = serde_json::to_string(entry)?;
        let mut journal = self.journal.lock().unwrap();
        journal.write_all(line.as_bytes())?;
        journal.write_all(b"\n")?;
        journal.flush()?;
        Ok(())
    }
}

fn apply_entry(state: &mut State, entry: JournalEntry) {
    match entry {
        JournalEntry::InsertDomain { id, name, updated_at } => {
            state.domains_by_id.insert(id, name.clone());
            state.domains_by_name.insert(
                name.clone(),
                Domain {
                    id,
                    name,
                    state: Access::Permitted,
                    comment: None,
                    updated_at,
                },
            );
            state.next_domain_id = state.next_domain_id.max(id + 1);
        }
        JournalEntry::UpdateDomain { name, state: access, comment, updated_at } => {
            if let Some(domain) = state.domains_by_name.get_mut(&name) {
                domain.state = access;
                domain.comment = comment;
                domain.updated_at = updated_at;
            }
        }
        JournalEntry::InsertRequest { id, domain_id, created_at } => {
            state.requests.insert(
                id,
                Request {
                    id,
                    domain_id,
                    state: RequestState::Queued,
                    comment: None,
                    created_at,
                },
            );
            state.requests_by_domain.entry(domain_id).or_default().push(id);
            state.next_request_id = state.next_request_id.max(id + 1);
        }
        JournalEntry::UpdateRequest { id, state: req_state, comment } => {
            if let Some(request) = state.requests.get_mut(&id) {
                request.state = req_state;
                request.comment = comment;
            }
        }
        JournalEntry::InsertModuleRecord { request_id, module, payload } => {
            state
                .module_records
                .entry(request_id)
                .or_default()
                .push(ModuleRecord { request_id, module, payload });
        }
        JournalEntry::SetModuleVersion { module, version, updated_at } => {
            state.module_versions.insert(
                module.clone(),
                ModuleVersion { module, version, updated_at },
            );
        }
        JournalEntry::InsertError { request_id, module, comment, created_at } => {
            state.errors.entry(request_id).or_default().push(ErrorRecord {
                request_id,
                module,
                comment,
                created_at,
            });
        }
    }
}

impl Persistence for JsonlPersistence {
    fn insert_domain(&self, name: &str) -> Result<u64, PersistenceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.domains_by_name.get(name) {
            return Ok(existing.id);
        }
        let id = state.next_domain_id;
        state.next_domain_id += 1;
        let updated_at = Utc::now();
        let domain = Domain {
            id,
            name: name.to_string(),
            state: Access::Permitted,
            comment: None,
            updated_at,
        };
        state.domains_by_id.insert(id, name.to_string());
        state.domains_by_name.insert(name.to_string(), domain);
        drop(state);
        self.append(&JournalEntry::InsertDomain { id, name: name.to_string(), updated_at })?;
        Ok(id)
    }

    fn update_domain(
        &self,
        name: &str,
        access: Access,
        comment: Option<String>,
    ) -> Result<(), PersistenceError> {
        let updated_at = Utc::now();
        {
            let mut state = self.state.lock().unwrap();
            let domain = state
                .domains_by_name
                .get_mut(name)
                .ok_or_else(|| PersistenceError::DomainNotFound(name.to_string()))?;
            domain.state = access;
            domain.comment = comment.clone();
            domain.updated_at = updated_at;
        }
        self.append(&JournalEntry::UpdateDomain {
            name: name.to_string(),
            state: access,
            comment,
            updated_at,
        })
    }

    fn find_domain(&self, name: &str) -> Result<Option<Domain>, PersistenceError> {
        let state = self.state.lock().unwrap();
        Ok(state.domains_by_name.get(name).cloned())
    }

    fn insert_request(&self, domain_id: u64) -> Result<u64, PersistenceError> {
        let id;
        let created_at = Utc::now();
        {
            let mut state = self.state.lock().unwrap();
            id = state.next_request_id;
            state.next_request_id += 1;
            state.requests.insert(
                id,
                Request {
                    id,
                    domain_id,
                    state: RequestState::Queued,
                    comment: None,
                    created_at,
                },
            );
            state.requests_by_domain.entry(domain_id).or_default().push(id);
        }
        self.append(&JournalEntry::InsertRequest { id, domain_id, created_at })?;
        Ok(id)
    }

    fn latest_request_for(&self, domain_id: u64) -> Result<Option<Request>, PersistenceError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .requests_by_domain
            .get(&domain_id)
            .and_then(|ids| ids.last())
            .and_then(|id| state.requests.get(id).cloned()))
    }

    fn update_request(
        &self,
        id: u64,
        req_state: RequestState,
        comment: Option<String>,
    ) -> Result<(), PersistenceError> {
        {
            let mut state = self.state.lock().unwrap();
            let request = state
                .requests
                .get_mut(&id)
                .ok_or(PersistenceError::RequestNotFound(id))?;
            request.state = req_state;
            request.comment = comment.clone();
        }
        self.append(&JournalEntry::UpdateRequest { id, state: req_state, comment })
    }

    fn is_request_valid(&self, request_id: u64, domain_name: &str) -> Result<bool, PersistenceError> {
        let state = self.state.lock().unwrap();
        let Some(request) = state.requests.get(&request_id) else {
            return Ok(false);
        };
        let Some(name) = state.domains_by_id.get(&request.domain_id) else {
            return Ok(false);
        };
        Ok(name == domain_name)
    }

    fn insert_module_record(
        &self,
        request_id: u64,
        module: &str,
        payload: serde_json::Value,
    ) -> Result<(), PersistenceError> {
        {
            let mut state = self.state.lock().unwrap();
            state.module_records.entry(request_id).or_default().push(ModuleRecord {
                request_id,
                module: module.to_string(),
                payload: payload.clone(),
            });
        }
        self.append(&JournalEntry::InsertModuleRecord {
            request_id,
            module: module.to_string(),
            payload,
        })
    }

    fn get_module_version(&self, module: &str) -> Result<Option<u64>, PersistenceError> {
        let state = self.state.lock().unwrap();
        Ok(state.module_versions.get(module).map(|v| v.version))
    }

    fn set_module_version(&self, module: &str, version: u64) -> Result<(), PersistenceError> {
        let updated_at = Utc::now();
        {
            let mut state = self.state.lock().unwrap();
            state.module_versions.insert(
                module.to_string(),
                ModuleVersion { module: module.to_string(), version, updated_at },
            );
        }
        self.append(&JournalEntry::SetModuleVersion { module: module.to_string(), version, updated_at })
    }

    fn insert_error(
        &self,
        request_id: u64,
        module: &str,
        comment: &str,
    ) -> Result<(), PersistenceError> {
        let created_at = Utc::now();
        {
            let mut state = self.state.lock().unwrap();
            state.errors.entry(request_id).or_default().push(ErrorRecord {
                request_id,
                module: module.to_string(),
                comment: comment.to_string(),
                created_at,
            });
        }
        self.append(&JournalEntry::InsertError {
            request_id,
            module: module.to_string(),
            comment: comment.to_string(),
            created_at,
        })
    }

    fn module_records_for(&self, request_id: u64) -> Result<Vec<ModuleRecord>, PersistenceError> {
        let state = self.state.lock().unwrap();
        Ok(state.module_records.get(&request_id).cloned().unwrap_or_default())
    }

    fn errors_for(&self, request_id: u64) -> Result<Vec<ErrorRecord>, PersistenceError> {
        let state = self.state.lock().unwrap();
        Ok(state.errors.get(&request_id).cloned().unwrap_or_default())
    }

    fn get_request(&self, id: u64) -> Result<Option<Request>, PersistenceError> {
        let state = self.state.lock().unwrap();
        Ok(state.requests.get(&id).cloned())
    }
}
