use decision_os::decisions::{
    CriteriaModel, DecisionHeader, DecisionId, DecisionRepository, HistoryEntry, RepositoryError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const HEADERS_FILE: &str = "decisions.jsonl";
const MODELS_FILE: &str = "models.jsonl";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn guard<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
}

fn admit_model(models: &mut Vec<CriteriaModel>, model: &CriteriaModel) -> Result<(), RepositoryError> {
    let version = model.version_ref();
    if models.iter().any(|stored| stored.version_ref() == version) {
        return Err(RepositoryError::Conflict);
    }
    models.push(model.clone());
    Ok(())
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryDecisionRepository {
    headers: Arc<Mutex<HashMap<DecisionId, DecisionHeader>>>,
    entries: Arc<Mutex<HashMap<DecisionId, Vec<HistoryEntry>>>>,
    models: Arc<Mutex<Vec<CriteriaModel>>>,
}

impl DecisionRepository for InMemoryDecisionRepository {
    fn insert(&self, header: DecisionHeader) -> Result<DecisionHeader, RepositoryError> {
        let mut headers = guard(&self.headers)?;
        if headers.contains_key(&header.id) {
            return Err(RepositoryError::Conflict);
        }
        headers.insert(header.id.clone(), header.clone());
        Ok(header)
    }

    fn fetch(&self, id: &DecisionId) -> Result<Option<DecisionHeader>, RepositoryError> {
        Ok(guard(&self.headers)?.get(id).cloned())
    }

    fn headers(&self) -> Result<Vec<DecisionHeader>, RepositoryError> {
        Ok(guard(&self.headers)?.values().cloned().collect())
    }

    fn append(&self, entry: &HistoryEntry) -> Result<(), RepositoryError> {
        let mut entries = guard(&self.entries)?;
        let ledger = entries.entry(entry.decision_id.clone()).or_default();
        if entry.sequence != ledger.len() as u64 {
            return Err(RepositoryError::Conflict);
        }
        ledger.push(entry.clone());
        Ok(())
    }

    fn entries(&self, id: &DecisionId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        Ok(guard(&self.entries)?.get(id).cloned().unwrap_or_default())
    }

    fn insert_model(&self, model: &CriteriaModel) -> Result<(), RepositoryError> {
        admit_model(&mut *guard(&self.models)?, model)
    }

    fn models(&self) -> Result<Vec<CriteriaModel>, RepositoryError> {
        Ok(guard(&self.models)?.clone())
    }
}

/// Length of one decision's ledger file, read lazily on first append.
type LedgerHandle = Arc<Mutex<Option<u64>>>;

/// Append-only JSON-lines store: `decisions.jsonl` for headers, `models.jsonl` for
/// registered criteria models, and one `<decision-id>.history.jsonl` per decision ledger.
///
/// Each ledger has its own lock, so a slow fsync on one decision does not stall
/// appends to another.
pub(crate) struct JsonlDecisionRepository {
    root: PathBuf,
    headers: Mutex<HashMap<DecisionId, DecisionHeader>>,
    models: Mutex<Vec<CriteriaModel>>,
    ledgers: Mutex<HashMap<DecisionId, LedgerHandle>>,
}

impl JsonlDecisionRepository {
    pub(crate) fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let mut headers = HashMap::new();
        let headers_path = root.join(HEADERS_FILE);
        if headers_path.exists() {
            for header in read_lines::<DecisionHeader>(&headers_path)? {
                headers.insert(header.id.clone(), header);
            }
        }
        let models_path = root.join(MODELS_FILE);
        let models = if models_path.exists() {
            read_lines::<CriteriaModel>(&models_path)?
        } else {
            Vec::new()
        };
        debug!(
            root = %root.display(),
            decisions = headers.len(),
            models = models.len(),
            "opened json-lines decision store"
        );

        Ok(Self {
            root,
            headers: Mutex::new(headers),
            models: Mutex::new(models),
            ledgers: Mutex::new(HashMap::new()),
        })
    }

    fn history_path(&self, id: &DecisionId) -> Result<PathBuf, RepositoryError> {
        let valid = !id.as_str().is_empty()
            && id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(RepositoryError::NotFound);
        }
        Ok(self.root.join(format!("{}.history.jsonl", id.as_str())))
    }

    fn ledger(&self, id: &DecisionId) -> Result<LedgerHandle, RepositoryError> {
        let mut ledgers = guard(&self.ledgers)?;
        Ok(Arc::clone(ledgers.entry(id.clone()).or_default()))
    }

    fn read_history(path: &Path) -> Result<Vec<HistoryEntry>, RepositoryError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_lines(path).map_err(unavailable)
    }
}

impl DecisionRepository for JsonlDecisionRepository {
    fn insert(&self, header: DecisionHeader) -> Result<DecisionHeader, RepositoryError> {
        self.history_path(&header.id)?;
        let mut headers = guard(&self.headers)?;
        if headers.contains_key(&header.id) {
            return Err(RepositoryError::Conflict);
        }
        append_line(&self.root.join(HEADERS_FILE), &header)?;
        headers.insert(header.id.clone(), header.clone());
        Ok(header)
    }

    fn fetch(&self, id: &DecisionId) -> Result<Option<DecisionHeader>, RepositoryError> {
        Ok(guard(&self.headers)?.get(id).cloned())
    }

    fn headers(&self) -> Result<Vec<DecisionHeader>, RepositoryError> {
        Ok(guard(&self.headers)?.values().cloned().collect())
    }

    fn append(&self, entry: &HistoryEntry) -> Result<(), RepositoryError> {
        let path = self.history_path(&entry.decision_id)?;
        let handle = self.ledger(&entry.decision_id)?;
        let mut length = guard(&handle)?;
        let expected = match *length {
            Some(length) => length,
            None => Self::read_history(&path)?.len() as u64,
        };
        if entry.sequence != expected {
            *length = Some(expected);
            return Err(RepositoryError::Conflict);
        }
        append_line(&path, entry)?;
        *length = Some(expected + 1);
        Ok(())
    }

    fn entries(&self, id: &DecisionId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let path = self.history_path(id)?;
        let handle = self.ledger(id)?;
        let _length = guard(&handle)?;
        Self::read_history(&path)
    }

    fn insert_model(&self, model: &CriteriaModel) -> Result<(), RepositoryError> {
        let mut models = guard(&self.models)?;
        let version = model.version_ref();
        if models.iter().any(|stored| stored.version_ref() == version) {
            return Err(RepositoryError::Conflict);
        }
        append_line(&self.root.join(MODELS_FILE), model)?;
        models.push(model.clone());
        Ok(())
    }

    fn models(&self) -> Result<Vec<CriteriaModel>, RepositoryError> {
        Ok(guard(&self.models)?.clone())
    }
}

fn unavailable(err: io::Error) -> RepositoryError {
    RepositoryError::Unavailable(err.to_string())
}

fn read_lines<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        records.push(record);
    }
    Ok(records)
}

fn append_line<T: serde::Serialize>(path: &Path, record: &T) -> Result<(), RepositoryError> {
    let mut line = serde_json::to_vec(record)
        .map_err(|err| RepositoryError::Unavailable(format!("failed to encode record: {err}")))?;
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(unavailable)?;
    file.write_all(&line).map_err(unavailable)?;
    file.sync_data().map_err(unavailable)
}
