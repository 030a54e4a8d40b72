use crate::state::entity::{Entity, EntityChange, EntityKind, EntityPatch, EntityUpdate};
use crate::state::metrics::SyncMetrics;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Revision at which each field was last written
#[derive(Clone, Copy, Debug, Default)]
struct FieldRevisions {
    kind: u64,
    position: u64,
    status: u64,
    name: u64,
    device: u64,
    accuracy: u64,
}

/// Stored record plus write bookkeeping
#[derive(Clone, Debug)]
struct Slot {
    entity: Entity,
    revisions: FieldRevisions,
    /// Highest revision that wrote any field of this entity
    touched: u64,
}

/// Revision reserved when a snapshot request is issued.
///
/// Snapshot data is at least as old as the moment it was requested, so its
/// writes are stamped with this revision rather than the (later) arrival time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotTicket {
    pub revision: u64,
    pub issued_at: DateTime<Utc>,
}

/// Result of a `replace_all` batch
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplaceSummary {
    pub upserted: usize,
    pub dropped: usize,
    pub removed: Vec<String>,
}

/// Reconciler owns the authoritative entity collection.
///
/// Every write carries a revision. A field only takes a new value when the
/// incoming revision is at least the one that last wrote it, which makes the
/// outcome of snapshot/stream races independent of processing order.
pub struct Reconciler {
    entities: DashMap<String, Slot>,

    /// Monotonic revision counter (last issued value)
    revision: AtomicU64,

    /// Broadcast channel for collection changes
    change_tx: broadcast::Sender<EntityChange>,

    /// Metrics tracker for monitoring
    pub metrics: SyncMetrics,
}

impl Reconciler {
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(1024);

        Self {
            entities: DashMap::new(),
            revision: AtomicU64::new(0),
            change_tx,
            metrics: SyncMetrics::new(),
        }
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last revision handed out
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Insert or shallow-merge a partial entity.
    ///
    /// Returns None when the patch has no identifier; such records are
    /// dropped with a warning and never touch other entities.
    pub fn upsert(&self, patch: EntityPatch) -> Option<EntityUpdate> {
        if patch.id.trim().is_empty() {
            warn!("Dropping entity update without identifier");
            self.metrics.record_dropped();
            return None;
        }

        let revision = self.next_revision();
        let update = self.apply(&patch, revision);
        self.metrics.record_update();
        self.publish(&update);
        Some(update)
    }

    /// Merge `patch` at `revision`, creating the record if needed
    fn apply(&self, patch: &EntityPatch, revision: u64) -> EntityUpdate {
        let now = Utc::now();
        let mut created = false;

        let mut slot = self.entities.entry(patch.id.clone()).or_insert_with(|| {
            created = true;
            Slot {
                entity: Entity::from_patch(patch, now),
                revisions: FieldRevisions::default(),
                touched: 0,
            }
        });

        let previous_position = (!created).then_some(slot.entity.position);
        let previous_status = slot.entity.status.clone();

        let Slot {
            entity,
            revisions,
            touched,
        } = &mut *slot;

        let mut accepted = false;
        let mut changed = false;
        let mut note = |outcome: Option<bool>| {
            if let Some(field_changed) = outcome {
                accepted = true;
                changed |= field_changed;
            }
        };

        if let Some(kind) = patch.kind {
            note(merge_field(&mut entity.kind, &mut revisions.kind, kind, revision));
        }
        if let Some(position) = patch.position {
            note(merge_field(
                &mut entity.position,
                &mut revisions.position,
                position,
                revision,
            ));
        }
        if let Some(status) = &patch.status {
            note(merge_field(
                &mut entity.status,
                &mut revisions.status,
                status.clone(),
                revision,
            ));
        }
        if let Some(name) = &patch.name {
            note(merge_field(
                &mut entity.name,
                &mut revisions.name,
                Some(name.clone()),
                revision,
            ));
        }
        if let Some(device) = &patch.device {
            note(merge_field(
                &mut entity.device,
                &mut revisions.device,
                Some(device.clone()),
                revision,
            ));
        }
        if let Some(accuracy) = patch.accuracy {
            note(merge_field(
                &mut entity.accuracy,
                &mut revisions.accuracy,
                Some(accuracy),
                revision,
            ));
        }

        if accepted || created {
            *touched = (*touched).max(revision);
        }
        if changed {
            entity.last_updated = now;
        }

        EntityUpdate {
            entity: entity.clone(),
            previous_position,
            created,
            position_changed: previous_position.is_some_and(|p| p != entity.position),
            status_changed: !created && previous_status != entity.status,
            changed: created || changed,
        }
    }

    fn publish(&self, update: &EntityUpdate) {
        if update.changed {
            let _ = self.change_tx.send(EntityChange::Upserted(update.clone()));
        }
    }

    /// Reserve a revision for a snapshot request about to be issued
    pub fn begin_snapshot(&self) -> SnapshotTicket {
        SnapshotTicket {
            revision: self.next_revision(),
            issued_at: Utc::now(),
        }
    }

    /// Apply a fresh snapshot: a batch of upserts at the ticket's revision,
    /// then removal of every entity the snapshot no longer lists.
    ///
    /// Entities written after the ticket was issued are newer than the
    /// snapshot and survive even when absent from it.
    pub fn replace_all(&self, ticket: SnapshotTicket, patches: Vec<EntityPatch>) -> ReplaceSummary {
        let mut summary = ReplaceSummary::default();
        // Kind each identifier was first listed with in this batch
        let mut listed: HashMap<String, Option<EntityKind>> = HashMap::with_capacity(patches.len());

        for patch in patches {
            if patch.id.trim().is_empty() {
                warn!("Dropping snapshot record without identifier");
                self.metrics.record_dropped();
                summary.dropped += 1;
                continue;
            }
            // Collections share one id space; the first record listed keeps the id
            if let Some(Some(first)) = listed.get(&patch.id) {
                if patch.kind.is_some_and(|kind| kind != *first) {
                    warn!(
                        entity_id = %patch.id,
                        kept = %first,
                        dropped = ?patch.kind,
                        "Dropping snapshot record whose id is already used by another kind"
                    );
                    self.metrics.record_dropped();
                    summary.dropped += 1;
                    continue;
                }
            }
            let update = self.apply(&patch, ticket.revision);
            self.publish(&update);
            listed.entry(patch.id).or_insert(patch.kind);
            summary.upserted += 1;
        }

        self.entities.retain(|id, slot| {
            let keep = listed.contains_key(id) || slot.touched > ticket.revision;
            if !keep {
                summary.removed.push(id.clone());
            }
            keep
        });

        for entity_id in &summary.removed {
            debug!(entity_id = %entity_id, "Stale entity removed");
            let _ = self.change_tx.send(EntityChange::Removed {
                entity_id: entity_id.clone(),
            });
        }

        self.metrics.record_snapshot();

        info!(
            upserted = summary.upserted,
            dropped = summary.dropped,
            removed = summary.removed.len(),
            revision = ticket.revision,
            "Applied snapshot"
        );

        summary
    }

    /// Get entity by ID
    pub fn get_entity(&self, entity_id: &str) -> Option<Entity> {
        self.entities.get(entity_id).map(|slot| slot.entity.clone())
    }

    /// All entities, ordered by identifier
    pub fn get_all_entities(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self
            .entities
            .iter()
            .map(|slot| slot.value().entity.clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Subscribe to collection changes
    pub fn subscribe(&self) -> broadcast::Receiver<EntityChange> {
        self.change_tx.subscribe()
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `value` into `slot` unless a newer revision already wrote it.
///
/// Returns None when rejected, otherwise whether the stored value changed.
fn merge_field<T: PartialEq>(slot: &mut T, field_rev: &mut u64, value: T, revision: u64) -> Option<bool> {
    if revision < *field_rev {
        return None;
    }
    *field_rev = revision;
    if *slot == value {
        Some(false)
    } else {
        *slot = value;
        Some(true)
    }
}
