use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{ConfigItem, Configuration};
use crate::point::Point;
use crate::types::PointIdentifier;

/// In-memory point database keyed by point identifier
///
/// A single lock guards every point, so an update of value, timestamp and alarm is never
/// observed half applied
#[derive(Debug, Default)]
pub struct PointStore {
    points: Mutex<BTreeMap<PointIdentifier, Point>>,
}

impl PointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one point per address of every configured block
    pub fn from_configuration(config: &Configuration) -> Self {
        let store = Self::new();
        for item in config.items() {
            store.add_block(item);
        }
        store
    }

    /// Add every point of a block, keeping the existing point if an identifier is already taken
    pub fn add_block(&self, item: &Arc<ConfigItem>) {
        let mut points = self.points.lock();
        for id in item.point_identifiers() {
            if points.contains_key(&id) {
                tracing::warn!("point {} is configured more than once, keeping the first", id);
                continue;
            }
            points.insert(id, Point::new(item.clone(), id.address));
        }
    }

    /// number of points
    pub fn len(&self) -> usize {
        self.points.lock().len()
    }

    /// true if no points are configured
    pub fn is_empty(&self) -> bool {
        self.points.lock().is_empty()
    }

    /// Snapshot of a single point
    pub fn get(&self, id: PointIdentifier) -> Option<Point> {
        self.points.lock().get(&id).cloned()
    }

    /// Snapshots of the requested points, unknown identifiers are skipped
    pub fn get_points(&self, ids: &[PointIdentifier]) -> Vec<Point> {
        let points = self.points.lock();
        ids.iter().filter_map(|id| points.get(id).cloned()).collect()
    }

    /// Snapshots of every point in identifier order
    pub fn snapshot(&self) -> Vec<Point> {
        self.points.lock().values().cloned().collect()
    }

    /// every identifier in order
    pub fn identifiers(&self) -> Vec<PointIdentifier> {
        self.points.lock().keys().copied().collect()
    }

    /// Run `f` on a point while holding the lock
    pub(crate) fn update<R>(&self, id: PointIdentifier, f: impl FnOnce(&mut Point) -> R) -> Option<R> {
        self.points.lock().get_mut(&id).map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PointType, UnitId};

    fn configuration() -> Configuration {
        Configuration::new(
            UnitId::default(),
            502,
            vec![
                ConfigItem::new(PointType::DigitalOutput, 2000, 3),
                ConfigItem::new(PointType::AnalogInput, 2000, 2),
                // overlaps the first block
                ConfigItem::new(PointType::DigitalOutput, 2002, 2),
            ],
        )
    }

    #[test]
    fn builds_a_point_per_address() {
        let store = PointStore::from_configuration(&configuration());
        assert_eq!(store.len(), 6);
        let point = store
            .get(PointIdentifier::new(PointType::DigitalOutput, 2003))
            .unwrap();
        assert_eq!(point.config().start_address, 2002);
        // duplicate keeps the first block's point
        let point = store
            .get(PointIdentifier::new(PointType::DigitalOutput, 2002))
            .unwrap();
        assert_eq!(point.config().start_address, 2000);
    }

    #[test]
    fn every_point_type_matches_its_block() {
        let store = PointStore::from_configuration(&configuration());
        for point in store.snapshot() {
            assert_eq!(point.id().point_type, point.config().registry_type);
        }
    }

    #[test]
    fn get_points_skips_unknown_identifiers() {
        let store = PointStore::from_configuration(&configuration());
        let points = store.get_points(&[
            PointIdentifier::new(PointType::AnalogInput, 2001),
            PointIdentifier::new(PointType::AnalogInput, 2002),
            PointIdentifier::new(PointType::DigitalOutput, 2000),
        ]);
        let ids: Vec<_> = points.iter().map(|x| x.id()).collect();
        assert_eq!(
            ids,
            vec![
                PointIdentifier::new(PointType::AnalogInput, 2001),
                PointIdentifier::new(PointType::DigitalOutput, 2000),
            ]
        );
    }

    #[test]
    fn update_returns_none_for_unknown_points() {
        let store = PointStore::from_configuration(&configuration());
        assert_eq!(
            store.update(PointIdentifier::new(PointType::HrLong, 1), |p| p.raw()),
            None
        );
        assert_eq!(
            store.update(PointIdentifier::new(PointType::AnalogInput, 2000), |p| p.raw()),
            Some(0)
        );
    }
}
