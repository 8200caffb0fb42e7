use std::fmt::Debug;
use std::ptr::NonNull;

/// Non-owning link to the next node at one level.
pub(crate) type Link<K, V> = Option<NonNull<Node<K, V>>>;

/// A single key/value entry together with its tower of forward links.
///
/// A node at level `l` owns `l + 1` forward slots, one for every level
/// `0..=l`, so a node present at some level is present at all lower ones.
/// The nodes the slots point at are owned by the list, not by this node.
pub struct Node<K, V> {
    key: K,
    value: V,
    pub(crate) forward: Box<[Link<K, V>]>,
}

impl<K, V> Node<K, V> {
    pub fn new(key: K, value: V, level: usize) -> Self {
        Self {
            key,
            value,
            forward: vec![None; level + 1].into_boxed_slice(),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn set_value(&mut self, value: V) {
        self.value = value;
    }

    /// Highest level index this node appears at.
    pub fn level(&self) -> usize {
        self.forward.len() - 1
    }

    pub(crate) fn into_value(self) -> V {
        self.value
    }
}

impl<K, V> Debug for Node<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("level", &self.level())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node() {
        let node = Node::new(7u32, "seven", 3);
        assert_eq!(*node.key(), 7);
        assert_eq!(*node.value(), "seven");
        assert_eq!(node.level(), 3);
        assert_eq!(node.forward.len(), 4);
        assert!(node.forward.iter().all(|link| link.is_none()));
    }

    #[test]
    fn test_level_zero_node() {
        let node = Node::new(1u32, 1u32, 0);
        assert_eq!(node.level(), 0);
        assert_eq!(node.forward.len(), 1);
    }

    #[test]
    fn test_set_value() {
        let mut node = Node::new(1u32, String::from("a"), 1);
        node.set_value(String::from("b"));
        assert_eq!(node.value(), "b");
        node.value_mut().push('c');
        assert_eq!(node.value(), "bc");
        assert_eq!(*node.key(), 1);
        assert_eq!(node.level(), 1);
        assert_eq!(node.into_value(), "bc");
    }
}
