use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Shared cache of definitions keyed by class name, with at-most-once definition per key
///
/// Two threads asking for the same name concurrently must not each materialize their own copy:
/// callers compare definitions by identity, so a second live copy would be a different class.
/// Each key gets its own slot with its own lock. The outer map lock is only held long enough to
/// find (or create) the slot, so defining one class never blocks lookups of another.
///
/// If the definer fails, nothing is recorded and a later call may try again.
pub struct DefinitionCache<T> {
    slots: Mutex<HashMap<String, Arc<Mutex<Option<Arc<T>>>>>>,
}

impl<T> DefinitionCache<T> {
    pub fn new() -> DefinitionCache<T> {
        DefinitionCache {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Lookup a definition without defining it
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()?;
        let defined = slot.lock().unwrap_or_else(PoisonError::into_inner);
        defined.clone()
    }

    /// Get the definition for `name`, running `define` if (and only if) there is none yet
    pub fn get_or_define<E>(
        &self,
        name: &str,
        define: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let slot: Arc<Mutex<Option<Arc<T>>>> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut defined = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = defined.as_ref() {
            return Ok(existing.clone());
        }
        log::trace!("Defining '{}'", name);
        let definition = Arc::new(define()?);
        *defined = Some(definition.clone());
        Ok(definition)
    }

    /// Number of names with a completed definition
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .values()
            .filter(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for DefinitionCache<T> {
    fn default() -> Self {
        DefinitionCache::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn concurrent_definitions_share_identity() {
        let cache: Arc<DefinitionCache<String>> = Arc::new(DefinitionCache::new());
        let definitions = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let definitions = definitions.clone();
                thread::spawn(move || {
                    cache
                        .get_or_define::<()>("test/Foo", || {
                            definitions.fetch_add(1, Ordering::SeqCst);
                            Ok(String::from("test/Foo"))
                        })
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<Arc<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(definitions.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_definition_can_be_retried() {
        let cache: DefinitionCache<u32> = DefinitionCache::new();
        assert_eq!(cache.get_or_define("a", || Err("nope")), Err("nope"));
        assert!(cache.get("a").is_none());
        assert_eq!(*cache.get_or_define::<&str>("a", || Ok(7)).unwrap(), 7);
        assert_eq!(cache.get("a").as_deref(), Some(&7));
    }
}
