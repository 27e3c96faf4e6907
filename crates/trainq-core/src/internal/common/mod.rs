#[macro_use]
pub(crate) mod ids;

pub(crate) mod error;
pub(crate) mod resources;
pub(crate) mod wrapped;

pub use wrapped::WrappedRcRefCell;

pub type Map<K, V> = hashbrown::HashMap<K, V, fxhash::FxBuildHasher>;
pub type Set<T> = hashbrown::HashSet<T, fxhash::FxBuildHasher>;

#[derive(Default, Debug)]
pub(crate) struct IdCounter {
    value: u64,
}

impl IdCounter {
    #[inline]
    pub fn next(&mut self) -> u64 {
        let value = self.value;
        self.value += 1;
        value
    }

    /// The value the next call of `next` returns.
    #[inline]
    pub fn peek(&self) -> u64 {
        self.value
    }

    #[cfg(test)]
    pub fn skip(&mut self, count: u64) {
        self.value += count;
    }
}
