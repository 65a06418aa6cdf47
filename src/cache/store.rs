use actix_web::web::Bytes;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Cache lookup key: path and query for same-origin requests, the full
/// URL otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(url: impl Into<String>) -> Self {
        RequestKey(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Same-origin response.
    Basic,
    /// Cross-origin response; never stored.
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub kind: ResponseKind,
}

#[derive(Debug, Default)]
struct CacheGeneration {
    entries: HashMap<RequestKey, StoredResponse>,
}

/// Named cache generations, kept in creation order.
#[derive(Debug)]
pub struct CacheStorage {
    generations: Mutex<Vec<(String, CacheGeneration)>>,
    /// Upper bound on distinct keys per generation for single puts.
    max_entries: usize,
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::bounded(usize::MAX)
    }
}

fn generation_mut<'a>(
    generations: &'a mut Vec<(String, CacheGeneration)>,
    name: &str,
) -> &'a mut CacheGeneration {
    let index = match generations.iter().position(|(n, _)| n == name) {
        Some(index) => index,
        None => {
            generations.push((name.to_owned(), CacheGeneration::default()));
            generations.len() - 1
        }
    };

    &mut generations[index].1
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(max_entries: usize) -> Self {
        CacheStorage {
            generations: Mutex::new(Vec::new()),
            max_entries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, CacheGeneration)>> {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the generation if it does not exist yet.
    pub fn open(&self, name: &str) {
        generation_mut(&mut self.lock(), name);
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len_of(&self, name: &str) -> Option<usize> {
        self.lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, generation)| generation.entries.len())
    }

    pub fn delete(&self, name: &str) -> bool {
        let mut generations = self.lock();
        let before = generations.len();
        generations.retain(|(n, _)| n != name);
        generations.len() != before
    }

    /// Stores one entry, creating the generation if needed. A full
    /// generation still accepts replacements but refuses new keys, in which
    /// case `false` is returned and nothing changes.
    pub fn put(&self, name: &str, key: RequestKey, response: StoredResponse) -> bool {
        let mut generations = self.lock();
        let generation = generation_mut(&mut generations, name);

        if generation.entries.len() >= self.max_entries && !generation.entries.contains_key(&key)
        {
            return false;
        }

        generation.entries.insert(key, response);
        true
    }

    /// Stores every entry under a single lock, creating the generation if
    /// needed. Used for the install manifest, so the entry bound does not
    /// apply.
    pub fn put_all(&self, name: &str, entries: Vec<(RequestKey, StoredResponse)>) {
        generation_mut(&mut self.lock(), name).entries.extend(entries);
    }

    /// First match across all generations, oldest generation first.
    pub fn match_any(&self, key: &RequestKey) -> Option<StoredResponse> {
        self.lock()
            .iter()
            .find_map(|(_, generation)| generation.entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &'static str) -> StoredResponse {
        StoredResponse {
            status: 200,
            headers: vec![],
            body: Bytes::from_static(body.as_bytes()),
            kind: ResponseKind::Basic,
        }
    }

    #[test]
    fn lookups_search_every_generation() {
        let storage = CacheStorage::new();
        storage.put("v1", RequestKey::new("/old.js"), response("old"));
        storage.put("v2", RequestKey::new("/app.js"), response("new"));

        assert_eq!(storage.keys(), vec!["v1".to_owned(), "v2".to_owned()]);
        assert!(storage.match_any(&RequestKey::new("/old.js")).is_some());

        assert!(storage.delete("v1"));
        assert!(!storage.delete("v1"));
        assert!(storage.match_any(&RequestKey::new("/old.js")).is_none());
        assert_eq!(storage.len_of("v2"), Some(1));
    }

    #[test]
    fn open_is_idempotent() {
        let storage = CacheStorage::new();
        storage.open("v1");
        storage.put("v1", RequestKey::new("/"), response("root"));
        storage.open("v1");

        assert_eq!(storage.keys().len(), 1);
        assert_eq!(storage.len_of("v1"), Some(1));
    }

    #[test]
    fn full_generation_refuses_new_keys() {
        let storage = CacheStorage::bounded(2);
        assert!(storage.put("v1", RequestKey::new("/?n=1"), response("1")));
        assert!(storage.put("v1", RequestKey::new("/?n=2"), response("2")));
        assert!(!storage.put("v1", RequestKey::new("/?n=3"), response("3")));

        // replacing an existing key is still allowed
        assert!(storage.put("v1", RequestKey::new("/?n=1"), response("one")));
        assert_eq!(storage.len_of("v1"), Some(2));
        assert_eq!(
            storage.match_any(&RequestKey::new("/?n=1")).unwrap().body,
            Bytes::from_static(b"one")
        );

        // other generations have their own budget
        assert!(storage.put("v2", RequestKey::new("/?n=3"), response("3")));
    }
}
