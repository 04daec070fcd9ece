use crate::bridge::{Action, BridgeSender};
use crate::mapping::{MappingId, MappingRecord, MappingSummary};
use tracing::{debug, warn};

/// Client mirror of the host's mapping list.
///
/// The list is only ever replaced wholesale by a host snapshot. Every
/// mutation is a request to the host; the result shows up with the next
/// snapshot, or not at all if the bridge is down.
#[derive(Debug)]
pub struct MappingStore {
    mappings: Vec<MappingRecord>,
    revision: u64,
    bridge: BridgeSender,
}

impl MappingStore {
    pub fn new(bridge: BridgeSender) -> Self {
        Self {
            mappings: Vec::new(),
            revision: 0,
            bridge,
        }
    }

    /// Replace the mirror with a host snapshot. Returns whether anything changed.
    pub fn apply_snapshot(&mut self, mappings: Vec<MappingRecord>) -> bool {
        if mappings == self.mappings {
            debug!("Mapping snapshot unchanged ({} entries)", mappings.len());
            return false;
        }
        self.mappings = mappings;
        self.revision += 1;
        debug!(
            "Mapping snapshot r{} with {} entries",
            self.revision,
            self.mappings.len()
        );
        true
    }

    /// Bumped once per snapshot that differs from the previous one
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MappingRecord> {
        self.mappings.get(index)
    }

    pub fn position_of(&self, id: MappingId) -> Option<usize> {
        self.mappings.iter().position(|m| m.id == Some(id))
    }

    pub fn summaries(&self) -> Vec<MappingSummary> {
        self.mappings.iter().map(MappingRecord::summary).collect()
    }

    /// Ask the host to append a default mapping
    pub fn add(&self) {
        self.bridge.send(Action::AddMapping);
    }

    /// Positional update against the last snapshot. If the host list moved
    /// on since then, a different record may be hit; prefer `update_by_id`.
    pub fn update(&self, index: usize, record: MappingRecord) -> bool {
        if index >= self.mappings.len() {
            warn!(
                "Not updating mapping {}: snapshot has {} entries",
                index,
                self.mappings.len()
            );
            return false;
        }
        self.bridge.send(Action::UpdateMapping { index, record });
        true
    }

    /// Update the record with this id, wherever it sits in the newest snapshot
    pub fn update_by_id(&self, id: MappingId, mut record: MappingRecord) -> bool {
        let Some(index) = self.position_of(id) else {
            warn!("Not updating mapping {}: not in current snapshot", id);
            return false;
        };
        record.id = Some(id);
        self.bridge.send(Action::UpdateMapping { index, record });
        true
    }

    /// Delete by position; the record's id, when it has one, rides along so
    /// the host can check it is removing the record the user saw
    pub fn delete(&self, index: usize) -> bool {
        let Some(existing) = self.mappings.get(index) else {
            warn!(
                "Not deleting mapping {}: snapshot has {} entries",
                index,
                self.mappings.len()
            );
            return false;
        };
        self.bridge.send(Action::DeleteMapping {
            index,
            id: existing.id,
        });
        true
    }

    /// Irreversible on the host; callers confirm with the user first
    pub fn clear(&self) {
        self.bridge.send(Action::ClearMappings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MidiType;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn store() -> (MappingStore, UnboundedReceiver<Action>) {
        let (bridge, rx) = BridgeSender::channel();
        (MappingStore::new(bridge), rx)
    }

    fn note(id: u64, num: i32) -> MappingRecord {
        MappingRecord {
            id: Some(MappingId(id)),
            midi_num: num,
            key_vk: 65,
            ..Default::default()
        }
    }

    #[test]
    fn same_snapshot_twice_is_idempotent() {
        let (mut store, _rx) = store();
        let snapshot = vec![note(1, 60), note(2, 62)];

        assert!(store.apply_snapshot(snapshot.clone()));
        let revision = store.revision();
        let summaries = store.summaries();

        assert!(!store.apply_snapshot(snapshot));
        assert_eq!(store.revision(), revision);
        assert_eq!(store.summaries(), summaries);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn mutations_are_requests_not_local_edits() {
        let (mut store, mut rx) = store();
        store.apply_snapshot(vec![note(1, 60)]);

        store.add();
        let edited = MappingRecord {
            midi_type: MidiType::Macro,
            macro_text: "hi".into(),
            ..Default::default()
        };
        assert!(store.update(0, edited.clone()));
        assert!(store.delete(0));
        store.clear();

        assert_eq!(rx.try_recv().unwrap(), Action::AddMapping);
        assert_eq!(
            rx.try_recv().unwrap(),
            Action::UpdateMapping { index: 0, record: edited }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Action::DeleteMapping { index: 0, id: Some(MappingId(1)) }
        );
        assert_eq!(rx.try_recv().unwrap(), Action::ClearMappings);

        // still the host's last word
        assert_eq!(store.get(0), Some(&note(1, 60)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn id_addressed_ops_follow_the_record() {
        let (mut store, mut rx) = store();
        store.apply_snapshot(vec![note(1, 60), note(2, 62)]);
        // host reordered since the user picked record 2
        store.apply_snapshot(vec![note(2, 62), note(3, 64), note(1, 60)]);

        assert!(store.update_by_id(MappingId(1), note(9, 70)));
        match rx.try_recv().unwrap() {
            Action::UpdateMapping { index, record } => {
                assert_eq!(index, 2);
                assert_eq!(record.id, Some(MappingId(1)));
                assert_eq!(record.midi_num, 70);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(store.delete(1));
        assert_eq!(
            rx.try_recv().unwrap(),
            Action::DeleteMapping { index: 1, id: Some(MappingId(3)) }
        );

        assert!(!store.update_by_id(MappingId(42), note(42, 0)));
        assert!(!store.delete(3));
        assert!(!store.update(7, note(1, 1)));
        assert!(rx.try_recv().is_err());
    }
}
