//! Name-keyed capability registry.
//!
//! One [`Registry`] exists per interface (engines, script objects, backend
//! realisations, console sinks) and lives inside the [`Bridge`].  Factories
//! are installed under a key plus optional aliases and resolved by key, or by
//! the interface's current default key when none is given.
//!
//! A key (or alias) can be registered once per interface.  A second
//! registration is a configuration error reported as
//! [`RegistryError::Duplicate`]; startup code treats it as fatal.
//!
//! [`Bridge`]: crate::bridge::Bridge

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::bridge::Bridge;

/// Builds a fresh `T` for the bridge it is resolved from.
pub type Factory<T> = Rc<dyn Fn(&Bridge) -> T>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{interface}: key {key:?} is already registered")]
    Duplicate { interface: &'static str, key: String },
    #[error("{interface}: no registration for key {key:?}")]
    Unknown { interface: &'static str, key: String },
}

struct Entry<T> {
    factory: Factory<T>,
    aliases: Vec<String>,
    flags: Vec<String>,
}

// ── Registry ──────────────────────────────────────────────────────────────────

pub struct Registry<T> {
    interface: &'static str,
    entries: RefCell<HashMap<String, Entry<T>>>,
    /// alias → canonical key
    aliases: RefCell<HashMap<String, String>>,
    default_key: RefCell<Option<String>>,
}

impl<T> Registry<T> {
    pub fn new(interface: &'static str) -> Self {
        Self {
            interface,
            entries: RefCell::new(HashMap::new()),
            aliases: RefCell::new(HashMap::new()),
            default_key: RefCell::new(None),
        }
    }

    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Install `factory` under `key` and every alias.
    ///
    /// The first key registered for an interface becomes its default.
    pub fn register(
        &self,
        key: &str,
        aliases: &[&str],
        factory: impl Fn(&Bridge) -> T + 'static,
    ) -> Result<(), RegistryError> {
        for name in std::iter::once(&key).chain(aliases.iter()) {
            if name.is_empty() || self.contains(name) {
                return Err(RegistryError::Duplicate {
                    interface: self.interface,
                    key: (*name).to_owned(),
                });
            }
        }

        {
            let mut alias_map = self.aliases.borrow_mut();
            for alias in aliases.iter().filter(|a| **a != key) {
                alias_map.insert((*alias).to_owned(), key.to_owned());
            }
        }
        self.entries.borrow_mut().insert(
            key.to_owned(),
            Entry {
                factory: Rc::new(factory),
                aliases: aliases.iter().map(|a| (*a).to_owned()).collect(),
                flags: Vec::new(),
            },
        );

        let mut default_key = self.default_key.borrow_mut();
        if default_key.is_none() {
            *default_key = Some(key.to_owned());
        }
        tracing::debug!(target: "registry", interface = self.interface, key, "registered");
        Ok(())
    }

    /// Tag a registration with `flag` (e.g. `"global"`).
    pub fn add_flag(&self, key: &str, flag: &str) -> Result<(), RegistryError> {
        let canonical = self.canonical(key).ok_or_else(|| self.unknown(key))?;
        let mut entries = self.entries.borrow_mut();
        let entry = entries.get_mut(&canonical).ok_or_else(|| self.unknown(key))?;
        if !entry.flags.iter().any(|f| f == flag) {
            entry.flags.push(flag.to_owned());
        }
        Ok(())
    }

    /// Make `key` the one [`Registry::resolve`] uses when none is given.
    /// Affects later resolutions only.
    pub fn set_default(&self, key: &str) {
        *self.default_key.borrow_mut() = Some(key.to_owned());
    }

    pub fn default_key(&self) -> Option<String> {
        self.default_key.borrow().clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key) || self.aliases.borrow().contains_key(key)
    }

    /// Canonical key for `key`, following aliases.
    pub fn canonical(&self, key: &str) -> Option<String> {
        if self.entries.borrow().contains_key(key) {
            return Some(key.to_owned());
        }
        self.aliases.borrow().get(key).cloned()
    }

    /// Factory for `key`, or for the default key when `key` is `None`.
    ///
    /// The factory is cloned out so no borrow is held while it runs; factories
    /// are free to touch the registry themselves.
    pub fn factory(&self, key: Option<&str>) -> Option<Factory<T>> {
        let key = match key {
            Some(k) => k.to_owned(),
            None => self.default_key()?,
        };
        let canonical = self.canonical(&key)?;
        self.entries.borrow().get(&canonical).map(|e| Rc::clone(&e.factory))
    }

    /// Build a fresh instance, or `None` when nothing is registered under the
    /// key.  Callers must check.
    pub fn resolve(&self, bridge: &Bridge, key: Option<&str>) -> Option<T> {
        let factory = self.factory(key)?;
        Some(factory(bridge))
    }

    /// `(key, aliases)` of every registration tagged with `flag`, sorted by key.
    pub fn flagged(&self, flag: &str) -> Vec<(String, Vec<String>)> {
        let mut found: Vec<_> = self
            .entries
            .borrow()
            .iter()
            .filter(|(_, e)| e.flags.iter().any(|f| f == flag))
            .map(|(k, e)| (k.clone(), e.aliases.clone()))
            .collect();
        found.sort();
        found
    }

    /// All canonical keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn unknown(&self, key: &str) -> RegistryError {
        RegistryError::Unknown { interface: self.interface, key: key.to_owned() }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> Rc<Bridge> {
        Bridge::new()
    }

    #[test]
    fn resolve_builds_fresh_instances() {
        let b = bridge();
        let reg: Registry<Rc<String>> = Registry::new("Greeting");
        reg.register("hello", &[], |_| Rc::new("hello".to_owned())).unwrap();

        let first = reg.resolve(&b, Some("hello")).unwrap();
        let second = reg.resolve(&b, Some("hello")).unwrap();
        assert_eq!(*first, "hello");
        assert!(!Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let reg: Registry<u32> = Registry::new("Number");
        reg.register("one", &[], |_| 1).unwrap();
        let err = reg.register("one", &[], |_| 11).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate { interface: "Number", key: "one".into() });
    }

    #[test]
    fn alias_collision_is_rejected() {
        let reg: Registry<u32> = Registry::new("Number");
        reg.register("one", &["uno"], |_| 1).unwrap();
        assert!(reg.register("uno", &[], |_| 1).is_err());
        assert!(reg.register("eins", &["uno"], |_| 1).is_err());
        // The failed registration left nothing behind.
        assert!(!reg.contains("eins"));
    }

    #[test]
    fn unknown_key_resolves_to_none() {
        let b = bridge();
        let reg: Registry<u32> = Registry::new("Number");
        assert!(reg.resolve(&b, Some("missing")).is_none());
        assert!(reg.resolve(&b, None).is_none());
    }

    #[test]
    fn aliases_resolve_to_canonical_factory() {
        let b = bridge();
        let reg: Registry<u32> = Registry::new("Number");
        reg.register("two", &["dos", "zwei"], |_| 2).unwrap();
        assert_eq!(reg.resolve(&b, Some("zwei")), Some(2));
        assert_eq!(reg.canonical("dos").as_deref(), Some("two"));
    }

    #[test]
    fn first_registration_is_default_until_changed() {
        let b = bridge();
        let reg: Registry<u32> = Registry::new("Number");
        reg.register("one", &[], |_| 1).unwrap();
        reg.register("two", &[], |_| 2).unwrap();
        assert_eq!(reg.resolve(&b, None), Some(1));

        reg.set_default("two");
        assert_eq!(reg.resolve(&b, None), Some(2));

        reg.set_default("nothing");
        assert_eq!(reg.resolve(&b, None), None);
    }

    #[test]
    fn flags_select_registrations() {
        let reg: Registry<u32> = Registry::new("Number");
        reg.register("b", &["bee"], |_| 2).unwrap();
        reg.register("a", &[], |_| 1).unwrap();
        reg.register("c", &[], |_| 3).unwrap();
        reg.add_flag("b", "global").unwrap();
        reg.add_flag("a", "global").unwrap();
        reg.add_flag("a", "global").unwrap();

        let flagged = reg.flagged("global");
        assert_eq!(flagged, vec![("a".into(), vec![]), ("b".into(), vec!["bee".to_owned()])]);
        assert!(reg.add_flag("zzz", "global").is_err());
    }
}
