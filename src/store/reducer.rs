//! Event reducer: one handler per event tag.
//!
//! Every handler checks all of its preconditions before touching the store,
//! so an event is either applied completely or not at all. Missing
//! ancestors are not errors: a DATA or DEATH that overtakes its BIRTH on the
//! way here is dropped until the BIRTH arrives. Only BIRTH (and INITIAL)
//! create entities.
//!
//! Freshness: every entity an event touches advances its `last_message_at`
//! to the latest of its current value, the payload's own timestamp and the
//! envelope timestamp. It never moves back.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};

use super::{Store, StoreDevice, StoreGroup, StoreNode};
use crate::events::{
    DeviceBirthEvent, DeviceDataEvent, DeviceDeathEvent, EventRecord, InitialEvent,
    NodeBirthEvent, NodeDataEvent, NodeDeathEvent, SparkplugEvent,
};
use crate::model::{device_key, metric_key, node_key, Metric};

/// Why an event left the store unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownGroup(String),
    UnknownNode(String),
    UnknownDevice(String),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::UnknownGroup(id) => write!(f, "unknown group '{}'", id),
            IgnoreReason::UnknownNode(id) => write!(f, "unknown node '{}'", id),
            IgnoreReason::UnknownDevice(id) => write!(f, "unknown device '{}'", id),
        }
    }
}

/// Outcome of applying one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Ignored(IgnoreReason),
}

impl Applied {
    pub fn is_changed(&self) -> bool {
        matches!(self, Applied::Changed)
    }
}

/// Apply `record` to `store` and return the next store.
pub fn reduce(mut store: Store, record: &EventRecord) -> Store {
    store.apply(record);
    store
}

impl Store {
    /// Apply one validated record in place.
    pub fn apply(&mut self, record: &EventRecord) -> Applied {
        self.apply_at(&record.event, record.timestamp)
    }

    /// Apply `event` carried by an envelope stamped `at`.
    pub fn apply_at(&mut self, event: &SparkplugEvent, at: DateTime<Utc>) -> Applied {
        let applied = match event {
            // Snapshot entities carry their own freshness
            SparkplugEvent::Initial(e) => self.handle_initial(e),
            SparkplugEvent::NodeBirth(e) => self.handle_node_birth(e, at),
            SparkplugEvent::NodeData(e) => self.handle_node_data(e, at),
            SparkplugEvent::NodeDeath(e) => self.handle_node_death(e, at),
            SparkplugEvent::DeviceBirth(e) => self.handle_device_birth(e, at),
            SparkplugEvent::DeviceData(e) => self.handle_device_data(e, at),
            SparkplugEvent::DeviceDeath(e) => self.handle_device_death(e, at),
        };

        if let Applied::Ignored(reason) = &applied {
            tracing::debug!("[reducer] {} ignored: {}", event.event_type(), reason);
        }
        applied
    }

    fn handle_initial(&mut self, event: &InitialEvent) -> Applied {
        let mut next = Store::new();

        for group in &event.groups {
            let store_group = next
                .groups
                .entry(group.id.clone())
                .or_insert_with(|| StoreGroup {
                    id: group.id.clone(),
                    last_message_at: group.last_message_at,
                    node_ids: BTreeSet::new(),
                });
            advance(&mut store_group.last_message_at, group.last_message_at);

            for node in &group.nodes {
                // Keys come from the parent context, not the child's own back-references
                let nk = node_key(&group.id, &node.id);
                store_group.node_ids.insert(nk.clone());

                let store_node = next.nodes.entry(nk.clone()).or_insert_with(|| StoreNode {
                    id: node.id.clone(),
                    group_id: group.id.clone(),
                    last_message_at: node.last_message_at,
                    online: node.online,
                    device_ids: BTreeSet::new(),
                    metric_ids: BTreeSet::new(),
                });
                advance(&mut store_node.last_message_at, node.last_message_at);
                store_node.online = node.online;

                for metric in &node.metrics {
                    let mk = metric_key(&nk, metric.alias);
                    store_node.metric_ids.insert(mk.clone());
                    next.metrics.insert(mk, metric.clone());
                }

                for device in &node.devices {
                    let dk = device_key(&group.id, &node.id, &device.id);
                    store_node.device_ids.insert(dk.clone());

                    let store_device =
                        next.devices.entry(dk.clone()).or_insert_with(|| StoreDevice {
                            id: device.id.clone(),
                            node_id: node.id.clone(),
                            group_id: group.id.clone(),
                            last_message_at: device.last_message_at,
                            online: device.online,
                            metric_ids: BTreeSet::new(),
                        });
                    advance(&mut store_device.last_message_at, device.last_message_at);
                    store_device.online = device.online;

                    for metric in &device.metrics {
                        let mk = metric_key(&dk, metric.alias);
                        store_device.metric_ids.insert(mk.clone());
                        next.metrics.insert(mk, metric.clone());
                    }
                }
            }
        }

        tracing::debug!(
            "[reducer] INITIAL loaded {} groups, {} nodes, {} devices, {} metrics",
            next.groups.len(),
            next.nodes.len(),
            next.devices.len(),
            next.metrics.len()
        );
        *self = next;
        Applied::Changed
    }

    fn handle_node_birth(&mut self, event: &NodeBirthEvent, at: DateTime<Utc>) -> Applied {
        let node = &event.node;
        let nk = node.key();
        let fresh = node.last_message_at.max(at);

        let group = self
            .groups
            .entry(node.group_id.clone())
            .or_insert_with(|| StoreGroup {
                id: node.group_id.clone(),
                last_message_at: fresh,
                node_ids: BTreeSet::new(),
            });
        group.node_ids.insert(nk.clone());
        advance(&mut group.last_message_at, fresh);

        let store_node = self.nodes.entry(nk.clone()).or_insert_with(|| StoreNode {
            id: node.id.clone(),
            group_id: node.group_id.clone(),
            last_message_at: fresh,
            online: true,
            device_ids: BTreeSet::new(),
            metric_ids: BTreeSet::new(),
        });
        store_node.metric_ids =
            declare_metrics(&mut self.metrics, &store_node.metric_ids, &nk, &event.node_metrics);
        store_node.online = true;
        advance(&mut store_node.last_message_at, fresh);

        Applied::Changed
    }

    fn handle_node_data(&mut self, event: &NodeDataEvent, at: DateTime<Utc>) -> Applied {
        let node = &event.node;
        let Some(group) = self.groups.get_mut(&node.group_id) else {
            return Applied::Ignored(IgnoreReason::UnknownGroup(node.group_id.clone()));
        };
        let nk = node.key();
        let Some(store_node) = self.nodes.get_mut(&nk) else {
            return Applied::Ignored(IgnoreReason::UnknownNode(nk));
        };

        let updated = update_metric_values(
            &mut self.metrics,
            &store_node.metric_ids,
            &nk,
            &event.node_metrics,
        );
        tracing::trace!("[reducer] NDATA {} updated {} metrics", nk, updated);

        let fresh = node.last_message_at.max(at);
        advance(&mut store_node.last_message_at, fresh);
        advance(&mut group.last_message_at, fresh);
        Applied::Changed
    }

    fn handle_node_death(&mut self, event: &NodeDeathEvent, at: DateTime<Utc>) -> Applied {
        let node = &event.node;
        let Some(group) = self.groups.get_mut(&node.group_id) else {
            return Applied::Ignored(IgnoreReason::UnknownGroup(node.group_id.clone()));
        };
        let nk = node.key();
        let Some(store_node) = self.nodes.get_mut(&nk) else {
            return Applied::Ignored(IgnoreReason::UnknownNode(nk));
        };

        let fresh = node.last_message_at.max(at);
        store_node.online = false;
        mark_stale(&mut self.metrics, &store_node.metric_ids);
        for dk in &store_node.device_ids {
            if let Some(device) = self.devices.get_mut(dk) {
                device.online = false;
                mark_stale(&mut self.metrics, &device.metric_ids);
                advance(&mut device.last_message_at, fresh);
            }
        }

        advance(&mut store_node.last_message_at, fresh);
        advance(&mut group.last_message_at, fresh);
        Applied::Changed
    }

    fn handle_device_birth(&mut self, event: &DeviceBirthEvent, at: DateTime<Utc>) -> Applied {
        let (node, device) = (&event.node, &event.device);
        let Some(group) = self.groups.get_mut(&node.group_id) else {
            return Applied::Ignored(IgnoreReason::UnknownGroup(node.group_id.clone()));
        };
        let nk = node.key();
        let Some(store_node) = self.nodes.get_mut(&nk) else {
            return Applied::Ignored(IgnoreReason::UnknownNode(nk));
        };

        let fresh = device.last_message_at.max(at);
        let dk = device_key(&node.group_id, &node.id, &device.id);
        let store_device = self.devices.entry(dk.clone()).or_insert_with(|| StoreDevice {
            id: device.id.clone(),
            node_id: node.id.clone(),
            group_id: node.group_id.clone(),
            last_message_at: fresh,
            online: true,
            metric_ids: BTreeSet::new(),
        });
        store_device.metric_ids = declare_metrics(
            &mut self.metrics,
            &store_device.metric_ids,
            &dk,
            &event.device_metrics,
        );
        store_device.online = true;
        advance(&mut store_device.last_message_at, fresh);

        store_node.device_ids.insert(dk);
        let ancestors = node.last_message_at.max(fresh);
        advance(&mut store_node.last_message_at, ancestors);
        advance(&mut group.last_message_at, ancestors);
        Applied::Changed
    }

    fn handle_device_data(&mut self, event: &DeviceDataEvent, at: DateTime<Utc>) -> Applied {
        let (node, device) = (&event.node, &event.device);
        let Some(group) = self.groups.get_mut(&node.group_id) else {
            return Applied::Ignored(IgnoreReason::UnknownGroup(node.group_id.clone()));
        };
        let nk = node.key();
        let Some(store_node) = self.nodes.get_mut(&nk) else {
            return Applied::Ignored(IgnoreReason::UnknownNode(nk));
        };
        let dk = device_key(&node.group_id, &node.id, &device.id);
        let Some(store_device) = self.devices.get_mut(&dk) else {
            return Applied::Ignored(IgnoreReason::UnknownDevice(dk));
        };

        let updated = update_metric_values(
            &mut self.metrics,
            &store_device.metric_ids,
            &dk,
            &event.device_metrics,
        );
        tracing::trace!("[reducer] DDATA {} updated {} metrics", dk, updated);

        let fresh = device.last_message_at.max(at);
        advance(&mut store_device.last_message_at, fresh);
        let ancestors = node.last_message_at.max(fresh);
        advance(&mut store_node.last_message_at, ancestors);
        advance(&mut group.last_message_at, ancestors);
        Applied::Changed
    }

    fn handle_device_death(&mut self, event: &DeviceDeathEvent, at: DateTime<Utc>) -> Applied {
        let (node, device) = (&event.node, &event.device);
        let Some(group) = self.groups.get_mut(&node.group_id) else {
            return Applied::Ignored(IgnoreReason::UnknownGroup(node.group_id.clone()));
        };
        let nk = node.key();
        let Some(store_node) = self.nodes.get_mut(&nk) else {
            return Applied::Ignored(IgnoreReason::UnknownNode(nk));
        };
        let dk = device_key(&node.group_id, &node.id, &device.id);
        let Some(store_device) = self.devices.get_mut(&dk) else {
            return Applied::Ignored(IgnoreReason::UnknownDevice(dk));
        };

        store_device.online = false;
        mark_stale(&mut self.metrics, &store_device.metric_ids);

        // A dying device's payload timestamp may be unset, the envelope is not
        let fresh = device.last_message_at.max(at);
        advance(&mut store_device.last_message_at, fresh);
        let ancestors = node.last_message_at.max(fresh);
        advance(&mut store_node.last_message_at, ancestors);
        advance(&mut group.last_message_at, ancestors);
        Applied::Changed
    }
}

/// Move a freshness timestamp forward, never back.
fn advance(at: &mut DateTime<Utc>, candidate: DateTime<Utc>) {
    if candidate > *at {
        *at = candidate;
    }
}

/// Replace an owner's metric declaration with `payload`.
///
/// Metrics the previous declaration had but `payload` lacks are removed from
/// the map so no entry is left without an owner. Returns the new id set.
fn declare_metrics(
    metrics: &mut HashMap<String, Metric>,
    previous: &BTreeSet<String>,
    owner_key: &str,
    payload: &[Metric],
) -> BTreeSet<String> {
    let declared: BTreeSet<String> = payload
        .iter()
        .map(|m| metric_key(owner_key, m.alias))
        .collect();

    for key in previous.difference(&declared) {
        metrics.remove(key);
    }
    for metric in payload {
        metrics.insert(metric_key(owner_key, metric.alias), metric.clone());
    }
    declared
}

/// Overwrite value fields of already-declared metrics. Unknown aliases are skipped.
fn update_metric_values(
    metrics: &mut HashMap<String, Metric>,
    owned: &BTreeSet<String>,
    owner_key: &str,
    payload: &[Metric],
) -> usize {
    let mut updated = 0;
    for incoming in payload {
        let key = metric_key(owner_key, incoming.alias);
        if !owned.contains(&key) {
            tracing::trace!("[reducer] skipping undeclared metric {}", key);
            continue;
        }
        if let Some(metric) = metrics.get_mut(&key) {
            metric.value = incoming.value.clone();
            metric.is_null = incoming.is_null;
            metric.timestamp = incoming.timestamp;
            metric.stale = false;
            updated += 1;
        }
    }
    updated
}

fn mark_stale(metrics: &mut HashMap<String, Metric>, ids: &BTreeSet<String>) {
    for id in ids {
        if let Some(metric) = metrics.get_mut(id) {
            metric.stale = true;
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::model::{DataType, Device, Node};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_709_287_200 + secs, 0).unwrap()
    }

    fn node(id: &str) -> Node {
        Node {
            id: id.into(),
            group_id: "G".into(),
            online: true,
            last_message_at: ts(0),
        }
    }

    fn device(node_id: &str, id: &str) -> Device {
        Device {
            id: id.into(),
            node_id: node_id.into(),
            group_id: "G".into(),
            online: true,
            last_message_at: ts(0),
        }
    }

    fn rec(event: SparkplugEvent) -> EventRecord {
        EventRecord::new(ts(0), event)
    }

    fn metrics(aliases: &[u64]) -> Vec<Metric> {
        aliases
            .iter()
            .map(|alias| Metric {
                name: format!("m{}", alias),
                alias: *alias,
                stale: false,
                data_type: DataType::Int64,
                timestamp: ts(0),
                is_null: false,
                value: serde_json::json!(alias),
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: a node death marks every device and metric below it
        #[test]
        fn prop_node_death_marks_everything(
            node_aliases in proptest::collection::vec(0u64..50, 0..10),
            device_aliases in proptest::collection::vec(
                proptest::collection::vec(0u64..50, 0..6), 0..6)
        ) {
            let mut store = Store::new();
            store.apply(&rec(SparkplugEvent::NodeBirth(NodeBirthEvent {
                node: node("N"),
                node_metrics: metrics(&node_aliases),
            })));
            for (i, aliases) in device_aliases.iter().enumerate() {
                store.apply(&rec(SparkplugEvent::DeviceBirth(DeviceBirthEvent {
                    node: node("N"),
                    device: device("N", &format!("D{}", i)),
                    device_metrics: metrics(aliases),
                })));
            }

            store.apply(&rec(SparkplugEvent::NodeDeath(NodeDeathEvent { node: node("N") })));

            prop_assert!(store.nodes.values().all(|n| !n.online));
            prop_assert!(store.devices.values().all(|d| !d.online));
            prop_assert!(store.metrics.values().all(|m| m.stale));
            prop_assert_eq!(store.devices.len(), device_aliases.len());
        }

        /// Property: data for unknown nodes or devices never changes the store
        #[test]
        fn prop_data_never_creates(
            known_aliases in proptest::collection::vec(0u64..20, 0..5),
            node_id in "[A-Z][a-z0-9]{0,6}",
            device_id in "[A-Z][a-z0-9]{0,6}",
            aliases in proptest::collection::vec(0u64..20, 0..5)
        ) {
            let mut store = Store::new();
            store.apply(&rec(SparkplugEvent::NodeBirth(NodeBirthEvent {
                node: node("known"),
                node_metrics: metrics(&known_aliases),
            })));
            let before = store.clone();

            store.apply(&rec(SparkplugEvent::NodeData(NodeDataEvent {
                node: node(&node_id),
                node_metrics: metrics(&aliases),
            })));
            store.apply(&rec(SparkplugEvent::DeviceData(DeviceDataEvent {
                node: node("known"),
                device: device("known", &device_id),
                device_metrics: metrics(&aliases),
            })));

            prop_assert_eq!(store, before);
        }

        /// Property: birth is idempotent and leaves no dangling ids
        #[test]
        fn prop_birth_idempotent(
            first in proptest::collection::vec(0u64..30, 0..8),
            second in proptest::collection::vec(0u64..30, 0..8)
        ) {
            let birth = |aliases: &[u64]| rec(SparkplugEvent::NodeBirth(NodeBirthEvent {
                node: node("N"),
                node_metrics: metrics(aliases),
            }));

            let once = reduce(reduce(Store::new(), &birth(&first)), &birth(&second));
            let twice = reduce(once.clone(), &birth(&second));

            prop_assert_eq!(&once, &twice);
            prop_assert!(once.dangling_ids().is_empty());
            prop_assert_eq!(once.metrics.len(), once.nodes["G/N"].metric_ids.len());
        }
    }
}
