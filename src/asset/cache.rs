/// Append-only arena addressing its items by small integer ids.
///
/// Ids are dense and start at zero, so they can be embedded directly in
/// batch keys.
pub struct AssetCache<T> {
    items: Vec<T>,
}

impl<T> AssetCache<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn insert(&mut self, item: T) -> u32 {
        let index = self.items.len() as u32;
        self.items.push(item);
        index
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.items.get(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (index as u32, item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for AssetCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut cache = AssetCache::new();
        let a = cache.insert("a");
        let b = cache.insert("b");

        assert_eq!((a, b), (0, 1));
        assert_eq!(cache.get(b), Some(&"b"));
        assert_eq!(cache.get(7), None);
        assert_eq!(cache.len(), 2);
    }
}
