//! Resource classes: named (queue, time limit, slots) bundles.

use gridrun_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Defaults applied to a submission that names this class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClass {
    pub name: String,
    pub queue: String,
    pub time_limit: Duration,
    pub slots: u32,
}

impl ResourceClass {
    pub fn new(
        name: impl Into<String>,
        queue: impl Into<String>,
        time_limit: Duration,
        slots: u32,
    ) -> Self {
        Self {
            name: name.into(),
            queue: queue.into(),
            time_limit,
            slots,
        }
    }
}

/// The set of resource classes known to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClasses {
    classes: BTreeMap<String, ResourceClass>,
}

impl ResourceClasses {
    /// An empty set with no classes at all.
    pub fn empty() -> Self {
        Self {
            classes: BTreeMap::new(),
        }
    }

    /// The built-in `hour`, `day` and `week` classes.
    pub fn builtin() -> Self {
        let mut classes = Self::empty();
        classes.insert(ResourceClass::new("hour", "hour", Duration::from_secs(HOUR), 1));
        classes.insert(ResourceClass::new("day", "day", Duration::from_secs(DAY), 2));
        classes.insert(ResourceClass::new("week", "week", Duration::from_secs(7 * DAY), 4));
        classes
    }

    /// Add a class, replacing any existing class with the same name.
    pub fn insert(&mut self, class: ResourceClass) -> Option<ResourceClass> {
        self.classes.insert(class.name.clone(), class)
    }

    pub fn get(&self, name: &str) -> Option<&ResourceClass> {
        self.classes.get(name)
    }

    /// Look a class up by name, failing with `UnknownResourceClass`.
    pub fn resolve(&self, name: &str) -> Result<&ResourceClass> {
        self.get(name)
            .ok_or_else(|| Error::UnknownResourceClass(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ResourceClasses {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_classes() {
        let classes = ResourceClasses::builtin();
        let hour = classes.resolve("hour").unwrap();
        assert_eq!(hour.queue, "hour");
        assert_eq!(hour.time_limit, Duration::from_secs(3600));
        assert_eq!(hour.slots, 1);

        let day = classes.resolve("day").unwrap();
        assert!(day.time_limit > hour.time_limit);
        assert_ne!(day.slots, hour.slots);

        assert_eq!(classes.names().collect::<Vec<_>>(), vec!["day", "hour", "week"]);
    }

    #[test]
    fn test_unknown_class() {
        let classes = ResourceClasses::builtin();
        let err = classes.resolve("Hour").unwrap_err();
        assert!(matches!(err, Error::UnknownResourceClass(ref n) if n == "Hour"));
    }

    #[test]
    fn test_insert_overrides() {
        let mut classes = ResourceClasses::builtin();
        let previous = classes.insert(ResourceClass::new(
            "hour",
            "short",
            Duration::from_secs(1800),
            2,
        ));
        assert!(previous.is_some());
        assert_eq!(classes.resolve("hour").unwrap().queue, "short");
        assert_eq!(classes.len(), 3);
    }
}
