//! Dependency tracker — the engine's cache of issues and blocking edges.
//!
//! Purely in-memory state; the issue tracker is the durable source of truth
//! and `reconcile` rebuilds the cache from it after a restart. Reads are
//! concurrent and writes serialize per issue id's shard, never behind one
//! global lock. The claim registries here are the sole idempotency
//! mechanism for spawn/respawn under at-least-once event delivery.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use pd_beads::{BeadsError, IssueStore};
use pd_core::state::{IssueKind, IssueStatus};
use pd_core::types::IssueId;

const SHARD_COUNT: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("invalid reference: issue '{issue_id}' is not known to the tracker")]
    UnknownIssue { issue_id: IssueId },
    #[error("invalid reference: issue '{issue_id}' is not a decision issue")]
    NotADecision { issue_id: IssueId },
}

/// Outcome of a respawn claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnClaim {
    /// The edge is now claimed; exactly this caller respawns.
    Claimed,
    /// Another event already claimed this edge.
    AlreadyClaimed,
    /// The work issue's edges were marked stale (caravan abandoned).
    Stale,
    /// The work issue is not in the cache.
    Unknown,
}

#[derive(Debug, Clone)]
struct IssueEntry {
    kind: IssueKind,
    status: IssueStatus,
    stale: bool,
    depends_on: BTreeSet<IssueId>,
    /// Decision ids already respawned for this work issue.
    respawned_edges: BTreeSet<IssueId>,
}

#[derive(Debug, Default)]
struct Shard {
    issues: HashMap<IssueId, IssueEntry>,
    /// Reverse index: decision id -> work issues depending on it. Sharded
    /// by the decision id.
    dependents: HashMap<IssueId, BTreeSet<IssueId>>,
    /// Decision issues with an active resolver claim.
    resolver_claims: HashSet<IssueId>,
}

#[derive(Debug)]
pub struct DependencyTracker {
    shards: Vec<RwLock<Shard>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub refreshed: usize,
    pub edges: usize,
    /// Ids the durable tracker could not resolve.
    pub skipped: Vec<IssueId>,
}

impl Default for DependencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(Shard::default())).collect(),
        }
    }

    fn shard_index(&self, id: &IssueId) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn read_shard(&self, id: &IssueId) -> RwLockReadGuard<'_, Shard> {
        match self.shards[self.shard_index(id)].read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_shard(&self, id: &IssueId) -> RwLockWriteGuard<'_, Shard> {
        match self.shards[self.shard_index(id)].write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Upsert an issue into the cache. The kind of an existing entry is
    /// immutable; only its status is refreshed.
    pub fn insert_issue(&self, id: &IssueId, kind: IssueKind, status: IssueStatus) {
        let mut shard = self.write_shard(id);
        match shard.issues.get_mut(id) {
            Some(entry) => {
                entry.status = status;
            }
            None => {
                shard.issues.insert(
                    id.clone(),
                    IssueEntry {
                        kind,
                        status,
                        stale: false,
                        depends_on: BTreeSet::new(),
                        respawned_edges: BTreeSet::new(),
                    },
                );
            }
        }
    }

    pub fn contains(&self, id: &IssueId) -> bool {
        self.read_shard(id).issues.contains_key(id)
    }

    pub fn kind_of(&self, id: &IssueId) -> Option<IssueKind> {
        self.read_shard(id).issues.get(id).map(|entry| entry.kind)
    }

    pub fn status_of(&self, id: &IssueId) -> Option<IssueStatus> {
        self.read_shard(id).issues.get(id).map(|entry| entry.status)
    }

    /// Insert a blocking edge. Idempotent: re-adding an existing edge is a
    /// no-op. Fails when either end is unknown or the target is not a
    /// decision issue.
    pub fn record_dependency(&self, work: &IssueId, decision: &IssueId) -> Result<(), TrackerError> {
        if !self.contains(work) {
            return Err(TrackerError::UnknownIssue {
                issue_id: work.clone(),
            });
        }
        match self.kind_of(decision) {
            None => {
                return Err(TrackerError::UnknownIssue {
                    issue_id: decision.clone(),
                });
            }
            Some(kind) if !kind.is_decision() => {
                return Err(TrackerError::NotADecision {
                    issue_id: decision.clone(),
                });
            }
            Some(_) => {}
        }

        {
            let mut shard = self.write_shard(work);
            if let Some(entry) = shard.issues.get_mut(work) {
                entry.depends_on.insert(decision.clone());
            }
        }
        {
            let mut shard = self.write_shard(decision);
            shard
                .dependents
                .entry(decision.clone())
                .or_default()
                .insert(work.clone());
        }
        Ok(())
    }

    /// True iff any edge from `work` targets a still-open decision issue.
    pub fn is_blocked(&self, work: &IssueId) -> bool {
        let depends_on = {
            let shard = self.read_shard(work);
            match shard.issues.get(work) {
                Some(entry) if !entry.stale => entry.depends_on.clone(),
                _ => return false,
            }
        };

        depends_on.iter().any(|decision| {
            let shard = self.read_shard(decision);
            shard
                .issues
                .get(decision)
                .map(|entry| entry.kind.is_decision() && entry.status.is_open())
                .unwrap_or(false)
        })
    }

    /// All work issues naming `decision` as a dependency target.
    pub fn dependents_of(&self, decision: &IssueId) -> BTreeSet<IssueId> {
        self.read_shard(decision)
            .dependents
            .get(decision)
            .cloned()
            .unwrap_or_default()
    }

    /// Update cached status to closed. Edges remain for audit. Returns
    /// whether the issue was known.
    pub fn mark_closed(&self, id: &IssueId) -> bool {
        let mut shard = self.write_shard(id);
        match shard.issues.get_mut(id) {
            Some(entry) => {
                entry.status = IssueStatus::Closed;
                true
            }
            None => false,
        }
    }

    /// Claim the resolver slot for an open decision issue. At most one
    /// claim succeeds per decision id; duplicates and claims on closed or
    /// unknown issues return false.
    pub fn claim_resolver(&self, decision: &IssueId) -> bool {
        let mut shard = self.write_shard(decision);
        let open_decision = shard
            .issues
            .get(decision)
            .map(|entry| entry.kind.is_decision() && entry.status.is_open())
            .unwrap_or(false);
        if !open_decision {
            return false;
        }
        shard.resolver_claims.insert(decision.clone())
    }

    /// Undo a resolver claim after a failed launch so a retry can spawn.
    pub fn release_resolver(&self, decision: &IssueId) {
        self.write_shard(decision).resolver_claims.remove(decision);
    }

    pub fn resolver_claimed(&self, decision: &IssueId) -> bool {
        self.read_shard(decision).resolver_claims.contains(decision)
    }

    /// Claim the respawn slot for one (work, decision) edge.
    pub fn claim_respawn(&self, work: &IssueId, decision: &IssueId) -> RespawnClaim {
        let mut shard = self.write_shard(work);
        match shard.issues.get_mut(work) {
            None => RespawnClaim::Unknown,
            Some(entry) if entry.stale => RespawnClaim::Stale,
            Some(entry) => {
                if entry.respawned_edges.insert(decision.clone()) {
                    RespawnClaim::Claimed
                } else {
                    RespawnClaim::AlreadyClaimed
                }
            }
        }
    }

    /// Undo a respawn claim after a failed relaunch.
    pub fn release_respawn(&self, work: &IssueId, decision: &IssueId) {
        let mut shard = self.write_shard(work);
        if let Some(entry) = shard.issues.get_mut(work) {
            entry.respawned_edges.remove(decision);
        }
    }

    /// Mark a work issue's pending edges stale (caravan abandoned). Late
    /// close events then resolve to no-ops instead of respawns.
    pub fn mark_stale(&self, work: &IssueId) -> bool {
        let mut shard = self.write_shard(work);
        match shard.issues.get_mut(work) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    /// Rebuild cached state from the durable issue tracker. `kind` is
    /// inferred from the decision label; edges are re-recorded from each
    /// issue's dependency list once all statuses are refreshed.
    pub fn reconcile(
        &self,
        store: &dyn IssueStore,
        ids: &[IssueId],
        decision_label: &str,
    ) -> Result<ReconcileReport, BeadsError> {
        let mut report = ReconcileReport::default();
        let mut dependency_lists: Vec<(IssueId, BTreeSet<IssueId>)> = Vec::new();

        for id in ids {
            let snapshot = match store.show(id) {
                Ok(snapshot) => snapshot,
                Err(err) if err.is_unavailable() => return Err(err),
                Err(_) => {
                    report.skipped.push(id.clone());
                    continue;
                }
            };
            let kind = if snapshot.labels.contains(decision_label) {
                IssueKind::Decision
            } else {
                IssueKind::Work
            };
            self.insert_issue(id, kind, snapshot.status);
            report.refreshed += 1;
            if !snapshot.dependencies.is_empty() {
                dependency_lists.push((id.clone(), snapshot.dependencies));
            }
        }

        for (work, dependencies) in dependency_lists {
            for decision in dependencies {
                if self.record_dependency(&work, &decision).is_ok() {
                    report.edges += 1;
                }
            }
        }

        Ok(report)
    }
}
