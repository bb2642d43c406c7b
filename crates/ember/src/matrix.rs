use std::collections::{BTreeMap, HashMap};

use crate::error::Error;
use crate::glow::{
    AddressingMode, ConnectionDisposition, ConnectionOperation, MatrixBody, MatrixConnection,
    MatrixContents, MatrixType, TreePath,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixChange {
    Changed,
    Connected,
    Disconnected,
}

/// Outcome for one requested target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedConnection {
    /// Final source list and disposition, ready for a response.
    pub connection: MatrixConnection,
    /// `None` when the request left the target untouched.
    pub change: Option<MatrixChange>,
    /// Sources as given in the request.
    pub requested: Vec<u32>,
}

/// Applies a batch of connection requests to `body`.
///
/// The whole batch is validated against the resulting state before
/// anything is written, so a rejected batch leaves the matrix untouched.
pub fn apply_connections(
    body: &mut MatrixBody,
    path: &TreePath,
    requested: &[MatrixConnection],
) -> Result<Vec<AppliedConnection>, Error> {
    let contents = body
        .contents
        .as_ref()
        .ok_or_else(|| Error::MissingContents(path.clone()))?;

    for request in requested {
        validate_addresses(contents, body, path, request)?;
    }

    let current = body.connections.clone().unwrap_or_default();
    let mut prospective: BTreeMap<u32, Vec<u32>> = current
        .iter()
        .map(|(target, connection)| (*target, connection.sources.clone()))
        .collect();

    let mut applied = Vec::with_capacity(requested.len());
    for request in requested {
        let existing = prospective.get(&request.target).cloned().unwrap_or_default();
        let operation = request.operation.unwrap_or_default();
        let (sources, change) = match operation {
            ConnectionOperation::Absolute => (request.sources.clone(), Some(MatrixChange::Changed)),
            ConnectionOperation::Connect => match connect(&existing, &request.sources) {
                Some(merged) => (merged, Some(MatrixChange::Connected)),
                None => (existing, None),
            },
            ConnectionOperation::Disconnect => (
                disconnect(&existing, &request.sources),
                Some(MatrixChange::Disconnected),
            ),
        };

        if change.is_some() {
            prospective.insert(request.target, sources.clone());
        }
        applied.push(AppliedConnection {
            connection: MatrixConnection {
                target: request.target,
                sources,
                operation: None,
                disposition: Some(match change {
                    Some(_) => ConnectionDisposition::Modified,
                    None => ConnectionDisposition::Tally,
                }),
            },
            change,
            requested: request.sources.clone(),
        });
    }

    validate_topology(contents, path, &prospective)?;

    let connections = body.connections.get_or_insert_with(BTreeMap::new);
    for result in applied.iter().filter(|a| a.change.is_some()) {
        let target = result.connection.target;
        let stored = connections
            .entry(target)
            .or_insert_with(|| MatrixConnection::new(target, Vec::new()));
        stored.sources = result.connection.sources.clone();
        stored.disposition = Some(ConnectionDisposition::Modified);
    }

    Ok(applied)
}

/// Merges `requested` into `existing`. Returns `None` for an empty
/// request, which leaves the target as it is.
pub fn connect(existing: &[u32], requested: &[u32]) -> Option<Vec<u32>> {
    if requested.is_empty() {
        return None;
    }
    let mut existing = existing.to_vec();
    existing.sort_unstable();
    let mut requested = requested.to_vec();
    requested.sort_unstable();
    requested.dedup();

    let mut merged = Vec::with_capacity(existing.len() + requested.len());
    let (mut i, mut j) = (0, 0);
    while i < existing.len() && j < requested.len() {
        match existing[i].cmp(&requested[j]) {
            std::cmp::Ordering::Less => {
                merged.push(existing[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                merged.push(requested[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                merged.push(existing[i]);
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&existing[i..]);
    merged.extend_from_slice(&requested[j..]);
    Some(merged)
}

/// Removes `requested` from `existing` with a single forward cursor.
/// `requested` must be ascending; an unsorted request removes fewer
/// sources than it names.
pub fn disconnect(existing: &[u32], requested: &[u32]) -> Vec<u32> {
    let mut cursor = 0;
    existing
        .iter()
        .copied()
        .filter(|source| {
            if cursor < requested.len() && *source == requested[cursor] {
                cursor += 1;
                false
            } else {
                true
            }
        })
        .collect()
}

fn validate_addresses(
    contents: &MatrixContents,
    body: &MatrixBody,
    path: &TreePath,
    request: &MatrixConnection,
) -> Result<(), Error> {
    match contents.mode.unwrap_or_default() {
        AddressingMode::Linear => {
            if let Some(count) = contents.target_count {
                if request.target >= count {
                    return Err(Error::invalid_connection(
                        path,
                        format!("target {} out of range (count {})", request.target, count),
                    ));
                }
            }
            if let Some(count) = contents.source_count {
                if let Some(source) = request.sources.iter().find(|s| **s >= count) {
                    return Err(Error::invalid_connection(
                        path,
                        format!("source {} out of range (count {})", source, count),
                    ));
                }
            }
        }
        AddressingMode::NonLinear => {
            let targets = body.targets.as_deref().unwrap_or_default();
            if !targets.contains(&request.target) {
                return Err(Error::invalid_connection(
                    path,
                    format!("unknown target {}", request.target),
                ));
            }
            let sources = body.sources.as_deref().unwrap_or_default();
            if let Some(source) = request.sources.iter().find(|s| !sources.contains(s)) {
                return Err(Error::invalid_connection(
                    path,
                    format!("unknown source {}", source),
                ));
            }
        }
    }
    Ok(())
}

fn validate_topology(
    contents: &MatrixContents,
    path: &TreePath,
    state: &BTreeMap<u32, Vec<u32>>,
) -> Result<(), Error> {
    let kind = contents.kind.unwrap_or_default();
    let per_target = match kind {
        MatrixType::OneToN | MatrixType::OneToOne => Some(1),
        MatrixType::NToN => contents.maximum_connects_per_target,
    };
    if let Some(limit) = per_target {
        if let Some((target, sources)) = state.iter().find(|(_, s)| s.len() > limit as usize) {
            return Err(Error::invalid_connection(
                path,
                format!(
                    "target {} would have {} sources (limit {})",
                    target,
                    sources.len(),
                    limit
                ),
            ));
        }
    }

    if kind == MatrixType::OneToOne {
        let mut owners: HashMap<u32, u32> = HashMap::new();
        for (target, sources) in state {
            for source in sources {
                if let Some(other) = owners.insert(*source, *target) {
                    return Err(Error::invalid_connection(
                        path,
                        format!("source {} already feeds target {}", source, other),
                    ));
                }
            }
        }
    }

    if let Some(limit) = contents.maximum_total_connects {
        let total: usize = state.values().map(Vec::len).sum();
        if total > limit as usize {
            return Err(Error::invalid_connection(
                path,
                format!("{} connections exceed the limit of {}", total, limit),
            ));
        }
    }
    Ok(())
}
