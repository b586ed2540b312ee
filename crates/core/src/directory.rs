//! Lookup maps rebuilt from full entity lists on every operation.

use std::collections::HashMap;

use crate::models::{app_name_key, App, Device};
use crate::types::{BinocularNumber, EntityId};

/// Devices indexed by id and by binocular number.
///
/// When two rows share a binocular number the first one in list order
/// wins the number lookup; both stay reachable by id.
#[derive(Debug, Clone, Default)]
pub struct DeviceDirectory {
    by_id: HashMap<EntityId, Device>,
    id_by_number: HashMap<BinocularNumber, EntityId>,
}

impl DeviceDirectory {
    pub fn new(devices: Vec<Device>) -> Self {
        let mut directory = Self::default();
        for device in devices {
            directory
                .id_by_number
                .entry(device.binocular_number)
                .or_insert_with(|| device.id.clone());
            directory.by_id.insert(device.id.clone(), device);
        }
        directory
    }

    pub fn by_id(&self, id: &str) -> Option<&Device> {
        self.by_id.get(id)
    }

    pub fn by_number(&self, number: BinocularNumber) -> Option<&Device> {
        self.id_by_number.get(&number).and_then(|id| self.by_id.get(id))
    }

    pub fn number_of(&self, id: &str) -> Option<BinocularNumber> {
        self.by_id.get(id).map(|d| d.binocular_number)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Insert or replace a device, e.g. right after creating it.
    pub fn insert(&mut self, device: Device) {
        self.id_by_number
            .entry(device.binocular_number)
            .or_insert_with(|| device.id.clone());
        self.by_id.insert(device.id.clone(), device);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Apps indexed by id and by case-insensitive name.
#[derive(Debug, Clone, Default)]
pub struct AppDirectory {
    by_id: HashMap<EntityId, App>,
    id_by_name: HashMap<String, EntityId>,
}

impl AppDirectory {
    pub fn new(apps: Vec<App>) -> Self {
        let mut directory = Self::default();
        for app in apps {
            directory.insert(app);
        }
        directory
    }

    pub fn by_id(&self, id: &str) -> Option<&App> {
        self.by_id.get(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&App> {
        self.id_by_name
            .get(&app_name_key(name))
            .and_then(|id| self.by_id.get(id))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Insert or replace an app. The first app registered under a name
    /// keeps the name lookup.
    pub fn insert(&mut self, app: App) {
        self.id_by_name
            .entry(app_name_key(&app.name))
            .or_insert_with(|| app.id.clone());
        self.by_id.insert(app.id.clone(), app);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, number: i64) -> Device {
        Device {
            id: id.into(),
            binocular_number: number,
            display_name: None,
            model: None,
            primary_email: None,
            is_disabled: false,
            disable_reason: None,
            status: None,
        }
    }

    fn app(id: &str, name: &str) -> App {
        serde_json::from_value(serde_json::json!({"id": id, "name": name})).unwrap()
    }

    #[test]
    fn device_lookup_by_number_and_id() {
        let dir = DeviceDirectory::new(vec![device("d3", 3), device("d7", 7)]);
        assert_eq!(dir.by_number(7).map(|d| d.id.as_str()), Some("d7"));
        assert_eq!(dir.number_of("d3"), Some(3));
        assert!(dir.by_number(9).is_none());
    }

    #[test]
    fn duplicate_numbers_keep_first_device() {
        let dir = DeviceDirectory::new(vec![device("first", 4), device("second", 4)]);
        assert_eq!(dir.by_number(4).map(|d| d.id.as_str()), Some("first"));
        assert!(dir.contains_id("second"));
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn app_lookup_ignores_case() {
        let dir = AppDirectory::new(vec![app("a1", "Beat Saber")]);
        assert_eq!(dir.by_name("beat saber").map(|a| a.id.as_str()), Some("a1"));
        assert!(dir.by_name("Half-Life").is_none());
    }
}
