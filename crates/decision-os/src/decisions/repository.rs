use super::criteria::CriteriaModel;
use super::domain::{DecisionHeader, DecisionId};
use super::history::HistoryEntry;

/// Persistence collaborator: durable headers plus an ordered, append-only entry log per
/// decision, and the custom criteria models those decisions were created against.
/// Implementations must give read-after-write consistency for a single writer.
pub trait DecisionRepository: Send + Sync {
    fn insert(&self, header: DecisionHeader) -> Result<DecisionHeader, RepositoryError>;
    fn fetch(&self, id: &DecisionId) -> Result<Option<DecisionHeader>, RepositoryError>;
    /// Every stored header, in no particular order.
    fn headers(&self) -> Result<Vec<DecisionHeader>, RepositoryError>;
    /// Append one entry. Must refuse any entry whose sequence is not the next one.
    fn append(&self, entry: &HistoryEntry) -> Result<(), RepositoryError>;
    fn entries(&self, id: &DecisionId) -> Result<Vec<HistoryEntry>, RepositoryError>;
    /// Store a registered model. Must refuse a second model with the same version.
    fn insert_model(&self, model: &CriteriaModel) -> Result<(), RepositoryError>;
    /// Stored models in insertion order.
    fn models(&self) -> Result<Vec<CriteriaModel>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
