use std::collections::HashMap;

/// Insertion-ordered set of entities keyed by natural key.
///
/// The first instance seen for a key is the one kept; later duplicates are
/// offered to a merge function and then dropped. Callers refer to entries
/// by the index [`Registry::intern`] returns.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    index: HashMap<String, usize>,
    entries: Vec<(String, T)>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the entry for `key`, inserting `item` if the key is new.
    pub fn intern(&mut self, key: String, item: T, merge: impl FnOnce(&mut T, T)) -> usize {
        match self.index.get(&key) {
            Some(&idx) => {
                merge(&mut self.entries[idx].1, item);
                idx
            }
            None => {
                let idx = self.entries.len();
                self.index.insert(key.clone(), idx);
                self.entries.push((key, item));
                idx
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str, &T)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, (k, item))| (i, k.as_str(), item))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fill `target`'s empty optional field from a later duplicate.
pub fn fill_missing<V>(target: &mut Option<V>, later: Option<V>) {
    if target.is_none() {
        *target = later;
    }
}
