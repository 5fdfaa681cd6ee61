use pathqueue::watch::{FileSnapshot, refine};
use pathqueue::{EventSet, QueueEvent};

#[test]
fn ordered_vocabulary_and_topics() {
    let topics: Vec<&str> = QueueEvent::ORDERED.iter().map(|e| e.topic()).collect();
    assert_eq!(
        topics,
        vec![
            "Rename",
            "Write",
            "Delete",
            "AttributeChange",
            "SizeIncrease",
            "LinkCountChanged",
            "AccessRevocation",
        ]
    );
    for event in QueueEvent::ORDERED {
        assert_eq!(event.to_string(), event.topic());
    }
}

#[test]
fn event_set_expands_in_delivery_order_regardless_of_construction() {
    let set = EventSet::ACCESS_REVOCATION | EventSet::RENAME | EventSet::SIZE_INCREASE;
    let events: Vec<QueueEvent> = set.events().collect();
    assert_eq!(
        events,
        vec![
            QueueEvent::Rename,
            QueueEvent::SizeIncrease,
            QueueEvent::AccessRevocation
        ]
    );

    assert_eq!(EventSet::empty().events().count(), 0);
    assert_eq!(EventSet::ALL.events().count(), 7);
    assert_eq!(EventSet::default(), EventSet::ALL);
}

#[test]
fn event_set_collects_from_events() {
    let set: EventSet = [QueueEvent::Write, QueueEvent::Delete, QueueEvent::Write]
        .into_iter()
        .collect();
    assert_eq!(set, EventSet::WRITE | EventSet::DELETE);

    let all: EventSet = QueueEvent::ORDERED.into_iter().collect();
    assert_eq!(all, EventSet::ALL);
}

#[test]
fn event_names_parse_loosely() {
    assert_eq!("write".parse::<QueueEvent>(), Ok(QueueEvent::Write));
    assert_eq!("Rename".parse::<QueueEvent>(), Ok(QueueEvent::Rename));
    assert_eq!(
        "attribute_change".parse::<QueueEvent>(),
        Ok(QueueEvent::AttributeChange)
    );
    assert_eq!(
        "link-count-changed".parse::<QueueEvent>(),
        Ok(QueueEvent::LinkCountChanged)
    );
    assert_eq!(
        " SIZEINCREASE ".parse::<QueueEvent>(),
        Ok(QueueEvent::SizeIncrease)
    );

    let err = "chmod".parse::<QueueEvent>().unwrap_err();
    assert!(err.contains("chmod"));
}

fn snapshot(size: u64, nlink: u64) -> FileSnapshot {
    FileSnapshot {
        size,
        nlink,
        mode: 0o100644,
        uid: 1000,
        gid: 1000,
    }
}

#[test]
fn growth_adds_size_increase() {
    let refined = refine(EventSet::WRITE, &snapshot(10, 1), &snapshot(20, 1));
    assert_eq!(refined, EventSet::WRITE | EventSet::SIZE_INCREASE);
}

#[test]
fn truncation_is_only_a_write() {
    let refined = refine(EventSet::WRITE, &snapshot(20, 1), &snapshot(0, 1));
    assert_eq!(refined, EventSet::WRITE);
}

#[test]
fn new_hard_link_replaces_attribute_change() {
    let refined = refine(EventSet::ATTRIBUTE_CHANGE, &snapshot(10, 1), &snapshot(10, 2));
    assert_eq!(refined, EventSet::LINK_COUNT_CHANGED);
}

#[test]
fn last_link_gone_means_delete() {
    let refined = refine(EventSet::ATTRIBUTE_CHANGE, &snapshot(10, 1), &snapshot(10, 0));
    assert_eq!(refined, EventSet::LINK_COUNT_CHANGED | EventSet::DELETE);
}

#[test]
fn mode_change_with_link_change_keeps_attribute_change() {
    let before = snapshot(10, 2);
    let after = FileSnapshot {
        mode: 0o100600,
        ..snapshot(10, 1)
    };
    let refined = refine(EventSet::ATTRIBUTE_CHANGE, &before, &after);
    assert_eq!(
        refined,
        EventSet::ATTRIBUTE_CHANGE | EventSet::LINK_COUNT_CHANGED
    );
}

#[test]
fn unchanged_stat_leaves_events_alone() {
    let same = snapshot(10, 1);
    assert_eq!(
        refine(EventSet::ATTRIBUTE_CHANGE, &same, &same),
        EventSet::ATTRIBUTE_CHANGE
    );
    assert_eq!(refine(EventSet::RENAME, &same, &same), EventSet::RENAME);
}
