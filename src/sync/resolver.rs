use std::fmt;
use thiserror::Error;

use crate::storage::{Channel, DatabaseError, Session};

/// Why a channel reference did not resolve to exactly one channel.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no channel matches \"{0}\"")]
    NotFound(String),

    /// Several channels share the url or name; retry with one of the ids.
    #[error("\"{reference}\" matches {} channels:\n{}", .candidates.len(), CandidateList(.candidates))]
    Ambiguous {
        reference: String,
        candidates: Vec<Channel>,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

struct CandidateList<'a>(&'a [Channel]);

impl fmt::Display for CandidateList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, channel) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}  {}  {}", channel.id, channel.name, channel.url)?;
        }
        Ok(())
    }
}

/// Finds the single channel whose id, url, or name equals `reference`.
///
/// Matching is exact and case-sensitive. Ids are unique, so a reference that
/// is ambiguous by name or url can always be narrowed by passing an id.
pub async fn resolve_channel(
    session: &mut Session,
    reference: &str,
) -> Result<Channel, ResolveError> {
    let mut candidates = session.find_channels(reference).await?;

    match candidates.len() {
        0 => Err(ResolveError::NotFound(reference.to_string())),
        1 => Ok(candidates.remove(0)),
        _ => {
            tracing::debug!(reference = %reference, matches = candidates.len(), "Ambiguous channel reference");
            Err(ResolveError::Ambiguous {
                reference: reference.to_string(),
                candidates,
            })
        }
    }
}
