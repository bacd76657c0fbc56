use dstore_core::Key;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Mutually inverse key rewrite
///
/// `invert_key(convert_key(k)) == k` must hold for every key the transform
/// accepts.
pub trait KeyTransform: Send + Sync {
    /// Rewrite a caller key into the wrapped datastore's key space
    fn convert_key(&self, key: &Key) -> Key;

    /// Rewrite a wrapped datastore key back into the caller's key space
    fn invert_key(&self, key: &Key) -> Key;

    /// Whether `a < b` implies `convert_key(a) < convert_key(b)`
    ///
    /// Only order-preserving transforms get key orders and key filters
    /// pushed down to the wrapped datastore.
    fn is_order_preserving(&self) -> bool {
        false
    }
}

/// Key rewrite function
pub type KeyMapping = Arc<dyn Fn(&Key) -> Key + Send + Sync>;

/// Transform built from a pair of functions
#[derive(Clone)]
pub struct Pair {
    convert: KeyMapping,
    invert: KeyMapping,
    order_preserving: bool,
}

impl Pair {
    pub fn new<C, I>(convert: C, invert: I) -> Self
    where
        C: Fn(&Key) -> Key + Send + Sync + 'static,
        I: Fn(&Key) -> Key + Send + Sync + 'static,
    {
        Self {
            convert: Arc::new(convert),
            invert: Arc::new(invert),
            order_preserving: false,
        }
    }

    /// Declare that `convert` preserves key order
    pub fn order_preserving(mut self) -> Self {
        self.order_preserving = true;
        self
    }
}

impl KeyTransform for Pair {
    fn convert_key(&self, key: &Key) -> Key {
        (self.convert)(key)
    }

    fn invert_key(&self, key: &Key) -> Key {
        (self.invert)(key)
    }

    fn is_order_preserving(&self) -> bool {
        self.order_preserving
    }
}

impl fmt::Debug for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pair")
            .field("order_preserving", &self.order_preserving)
            .finish_non_exhaustive()
    }
}

/// Moves keys beneath a fixed prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTransform {
    prefix: Key,
}

impl PrefixTransform {
    pub fn new(prefix: impl Into<Key>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &Key {
        &self.prefix
    }
}

impl KeyTransform for PrefixTransform {
    fn convert_key(&self, key: &Key) -> Key {
        self.prefix.child(key)
    }

    fn invert_key(&self, key: &Key) -> Key {
        match key.strip_ancestor(&self.prefix) {
            Some(rest) => rest,
            None => {
                warn!("Key {} is not under prefix {}", key, self.prefix);
                key.clone()
            }
        }
    }

    fn is_order_preserving(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_transform() {
        let t = PrefixTransform::new("/foo");
        assert_eq!(t.convert_key(&Key::new("/bar/baz")), Key::new("/foo/bar/baz"));
        assert_eq!(t.convert_key(&Key::root()), Key::new("/foo"));
        assert_eq!(t.invert_key(&Key::new("/foo/bar/baz")), Key::new("/bar/baz"));
        assert_eq!(t.invert_key(&Key::new("/foo")), Key::root());
        assert!(t.is_order_preserving());
    }

    #[test]
    fn test_prefix_transform_foreign_key_is_unchanged() {
        let t = PrefixTransform::new("/foo");
        assert_eq!(t.invert_key(&Key::new("/foobar")), Key::new("/foobar"));
        assert_eq!(t.invert_key(&Key::new("/other")), Key::new("/other"));
    }

    #[test]
    fn test_root_prefix_is_identity() {
        let t = PrefixTransform::new(Key::root());
        let k = Key::new("/a/b");
        assert_eq!(t.convert_key(&k), k);
        assert_eq!(t.invert_key(&k), k);
    }

    #[test]
    fn test_pair() {
        let pair = Pair::new(
            |k: &Key| Key::new("/abc").child(k),
            |k: &Key| Key::new(k.namespaces()[1..].join("/")),
        );
        let k = Key::new("/foo/bar");
        assert_eq!(pair.convert_key(&k), Key::new("/abc/foo/bar"));
        assert_eq!(pair.invert_key(&pair.convert_key(&k)), k);
        assert!(!pair.is_order_preserving());
        assert!(pair.order_preserving().is_order_preserving());
    }
}
