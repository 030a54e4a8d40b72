use super::*;
use std::sync::Arc;
use std::thread;

fn location(id: &str, lat: f64, lng: f64) -> EntityPatch {
    EntityPatch::new(id).position(lat, lng)
}

#[test]
fn test_upsert_creates_entity_with_defaults() {
    let reconciler = Reconciler::new();

    let update = reconciler.upsert(location("agent_001", 12.9, 77.6)).unwrap();
    assert!(update.created);
    assert_eq!(update.previous_position, None);

    let entity = reconciler.get_entity("agent_001").unwrap();
    assert_eq!(entity.position, Position::new(12.9, 77.6));
    assert_eq!(entity.status, AgentStatus::Available);
    assert_eq!(entity.kind, EntityKind::Agent);
    assert_eq!(entity.device, None);
    assert_eq!(entity.accuracy, None);
}

#[test]
fn test_same_update_twice_yields_one_record() {
    let reconciler = Reconciler::new();
    let patch = location("agent_001", 10.0, 20.0)
        .status(AgentStatus::OrderAssigned)
        .accuracy(4.0);

    reconciler.upsert(patch.clone());
    let second = reconciler.upsert(patch).unwrap();

    assert_eq!(reconciler.len(), 1);
    assert!(!second.changed);
    let entity = reconciler.get_entity("agent_001").unwrap();
    assert_eq!(entity.position, Position::new(10.0, 20.0));
    assert_eq!(entity.status, AgentStatus::OrderAssigned);
    assert_eq!(entity.accuracy, Some(4.0));
}

#[test]
fn test_partial_update_preserves_unspecified_fields() {
    let reconciler = Reconciler::new();
    reconciler.upsert(
        location("agent_001", 1.0, 1.0)
            .status(AgentStatus::PickedUp)
            .accuracy(5.0)
            .name("Ravi"),
    );

    let update = reconciler.upsert(location("agent_001", 10.0, 20.0)).unwrap();
    assert!(update.position_changed);
    assert!(!update.status_changed);
    assert_eq!(update.previous_position, Some(Position::new(1.0, 1.0)));

    let entity = reconciler.get_entity("agent_001").unwrap();
    assert_eq!(entity.position, Position::new(10.0, 20.0));
    assert_eq!(entity.status, AgentStatus::PickedUp);
    assert_eq!(entity.accuracy, Some(5.0));
    assert_eq!(entity.name.as_deref(), Some("Ravi"));
}

#[test]
fn test_zero_position_entity_is_kept_in_collection() {
    let reconciler = Reconciler::new();
    reconciler.upsert(location("agent_nofix", 0.0, 0.0).name("Waiting"));

    let entity = reconciler.get_entity("agent_nofix").unwrap();
    assert!(!entity.has_fix());
    assert_eq!(reconciler.get_all_entities().len(), 1);
}

#[test]
fn test_update_without_id_is_dropped() {
    let reconciler = Reconciler::new();
    reconciler.upsert(location("agent_001", 1.0, 1.0));

    assert!(reconciler.upsert(location("  ", 5.0, 5.0)).is_none());
    assert_eq!(reconciler.len(), 1);
    assert_eq!(reconciler.metrics.get_dropped_records(), 1);
    assert_eq!(
        reconciler.get_entity("agent_001").unwrap().position,
        Position::new(1.0, 1.0)
    );
}

#[test]
fn test_replace_all_removes_stale_entities() {
    let reconciler = Reconciler::new();
    reconciler.upsert(location("A", 1.0, 1.0));
    reconciler.upsert(location("B", 2.0, 2.0));
    let mut rx = reconciler.subscribe();

    let ticket = reconciler.begin_snapshot();
    let summary = reconciler.replace_all(ticket, vec![location("A", 1.0, 1.0)]);

    assert_eq!(summary.upserted, 1);
    assert_eq!(summary.removed, vec!["B".to_string()]);
    assert!(reconciler.get_entity("B").is_none());
    assert!(reconciler.get_entity("A").is_some());

    // A was unchanged, so the only broadcast is B's removal
    assert_eq!(
        rx.try_recv().unwrap(),
        EntityChange::Removed {
            entity_id: "B".to_string()
        }
    );
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_replace_all_merges_instead_of_replacing() {
    let reconciler = Reconciler::new();
    reconciler.upsert(location("A", 1.0, 1.0).accuracy(3.0));

    let ticket = reconciler.begin_snapshot();
    reconciler.replace_all(ticket, vec![EntityPatch::new("A").name("Asha")]);

    let entity = reconciler.get_entity("A").unwrap();
    assert_eq!(entity.name.as_deref(), Some("Asha"));
    assert_eq!(entity.accuracy, Some(3.0));
    assert_eq!(entity.position, Position::new(1.0, 1.0));
}

#[test]
fn test_snapshot_resolving_after_stream_keeps_stream_values() {
    let reconciler = Reconciler::new();

    let ticket = reconciler.begin_snapshot();
    reconciler.upsert(location("X", 2.0, 2.0).status(AgentStatus::PickedUp));
    reconciler.replace_all(
        ticket,
        vec![location("X", 1.0, 1.0).status(AgentStatus::Available)],
    );

    let entity = reconciler.get_entity("X").unwrap();
    assert_eq!(entity.position, Position::new(2.0, 2.0));
    assert_eq!(entity.status, AgentStatus::PickedUp);
}

#[test]
fn test_snapshot_resolving_before_stream_keeps_stream_values() {
    let reconciler = Reconciler::new();

    let ticket = reconciler.begin_snapshot();
    reconciler.replace_all(
        ticket,
        vec![location("X", 1.0, 1.0).status(AgentStatus::Available)],
    );
    reconciler.upsert(location("X", 2.0, 2.0).status(AgentStatus::PickedUp));

    let entity = reconciler.get_entity("X").unwrap();
    assert_eq!(entity.position, Position::new(2.0, 2.0));
    assert_eq!(entity.status, AgentStatus::PickedUp);
}

#[test]
fn test_snapshot_fills_fields_the_stream_never_sent() {
    let reconciler = Reconciler::new();

    let ticket = reconciler.begin_snapshot();
    reconciler.upsert(location("X", 2.0, 2.0));
    reconciler.replace_all(ticket, vec![location("X", 1.0, 1.0).name("Kiran")]);

    let entity = reconciler.get_entity("X").unwrap();
    assert_eq!(entity.position, Position::new(2.0, 2.0));
    assert_eq!(entity.name.as_deref(), Some("Kiran"));
}

#[test]
fn test_entity_streamed_during_fetch_survives_snapshot() {
    let reconciler = Reconciler::new();
    reconciler.upsert(location("old", 1.0, 1.0));

    let ticket = reconciler.begin_snapshot();
    reconciler.upsert(location("new", 3.0, 3.0));
    let summary = reconciler.replace_all(ticket, vec![]);

    assert_eq!(summary.removed, vec!["old".to_string()]);
    assert!(reconciler.get_entity("new").is_some());
}

#[test]
fn test_older_snapshot_cannot_override_newer_snapshot() {
    let reconciler = Reconciler::new();

    let first = reconciler.begin_snapshot();
    let second = reconciler.begin_snapshot();
    reconciler.replace_all(second, vec![location("A", 5.0, 5.0)]);
    let summary = reconciler.replace_all(first, vec![location("A", 1.0, 1.0)]);

    assert!(summary.removed.is_empty());
    assert_eq!(
        reconciler.get_entity("A").unwrap().position,
        Position::new(5.0, 5.0)
    );
}

#[test]
fn test_snapshot_drops_records_without_id() {
    let reconciler = Reconciler::new();
    let ticket = reconciler.begin_snapshot();

    let summary = reconciler.replace_all(
        ticket,
        vec![location("", 1.0, 1.0), location("A", 2.0, 2.0)],
    );

    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.upserted, 1);
    assert_eq!(reconciler.len(), 1);
}

#[test]
fn test_snapshot_id_shared_across_kinds_keeps_first_record() {
    let reconciler = Reconciler::new();
    let ticket = reconciler.begin_snapshot();

    let summary = reconciler.replace_all(
        ticket,
        vec![
            location("17", 12.9, 77.6).kind(EntityKind::Agent),
            location("17", 13.1, 77.2).kind(EntityKind::Order),
            location("17", 12.95, 77.65).kind(EntityKind::Agent),
        ],
    );

    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.upserted, 2);
    assert_eq!(reconciler.metrics.get_dropped_records(), 1);
    let entity = reconciler.get_entity("17").unwrap();
    assert_eq!(entity.kind, EntityKind::Agent);
    assert_eq!(entity.position, Position::new(12.95, 77.65));
}

#[test]
fn test_changes_broadcast_correctly() {
    let reconciler = Reconciler::new();
    let mut rx = reconciler.subscribe();

    reconciler.upsert(location("agent_001", 1.0, 2.0));

    match rx.try_recv().unwrap() {
        EntityChange::Upserted(update) => {
            assert_eq!(update.entity.id, "agent_001");
            assert!(update.created);
        }
        other => panic!("Expected upsert, got {:?}", other),
    }
}

#[test]
fn test_noop_update_is_not_broadcast() {
    let reconciler = Reconciler::new();
    reconciler.upsert(location("agent_001", 1.0, 2.0));
    let mut rx = reconciler.subscribe();

    reconciler.upsert(location("agent_001", 1.0, 2.0));

    assert!(rx.try_recv().is_err());
}

#[test]
fn test_get_all_entities_sorted() {
    let reconciler = Reconciler::new();
    reconciler.upsert(location("c", 1.0, 1.0));
    reconciler.upsert(location("a", 1.0, 1.0));
    reconciler.upsert(location("b", 1.0, 1.0));

    let ids: Vec<String> = reconciler
        .get_all_entities()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn test_concurrent_updates_same_entity() {
    let reconciler = Arc::new(Reconciler::new());
    let mut handles = vec![];

    for i in 0..10 {
        let reconciler = Arc::clone(&reconciler);
        handles.push(thread::spawn(move || {
            reconciler.upsert(location("shared", i as f64 + 1.0, 1.0));
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(reconciler.len(), 1);
    assert_eq!(reconciler.metrics.get_total_updates(), 10);
}
