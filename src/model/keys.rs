//! Composite identifiers.
//!
//! Local ids are only unique within their parent: two groups may both own a
//! node called `"N1"`. Every store index and UI row id is therefore derived
//! by joining the ancestors' local ids with `/`.

/// Key of a node: `group/node`.
pub fn node_key(group_id: &str, node_id: &str) -> String {
    format!("{}/{}", group_id, node_id)
}

/// Key of a device: `group/node/device`.
pub fn device_key(group_id: &str, node_id: &str, device_id: &str) -> String {
    format!("{}/{}/{}", group_id, node_id, device_id)
}

/// Key of a metric below its owner (a node key or a device key).
///
/// The alias is the discriminator; metric names are informational.
pub fn metric_key(owner_key: &str, alias: u64) -> String {
    format!("{}/{}", owner_key, alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key() {
        assert_eq!(node_key("G1", "N1"), "G1/N1");
    }

    #[test]
    fn test_device_key() {
        assert_eq!(device_key("G1", "N1", "D1"), "G1/N1/D1");
    }

    #[test]
    fn test_metric_key_for_node_and_device_owners() {
        assert_eq!(metric_key(&node_key("G1", "N1"), 7), "G1/N1/7");
        assert_eq!(metric_key(&device_key("G1", "N1", "D1"), 7), "G1/N1/D1/7");
    }

    #[test]
    fn test_same_local_id_in_different_groups() {
        assert_ne!(node_key("G1", "N1"), node_key("G2", "N1"));
        assert_ne!(
            metric_key(&node_key("G1", "N1"), 1),
            metric_key(&node_key("G2", "N1"), 1)
        );
    }

    #[test]
    fn test_keys_are_stable() {
        let first = metric_key(&device_key("Plant", "Line-3", "PLC"), 42);
        for _ in 0..3 {
            assert_eq!(metric_key(&device_key("Plant", "Line-3", "PLC"), 42), first);
        }
    }
}
