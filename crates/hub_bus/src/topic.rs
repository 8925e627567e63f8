//! Topic tree
//!
//! Topics form a `/` separated hierarchy rooted at the message bus. Nodes are
//! created lazily, memoized by their parent and never destroyed, so asking
//! for the same path twice yields the same `Arc<Topic>`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use hub_types::is_valid_topic_segment;
use parking_lot::Mutex;

use crate::BusError;

/// Separator between topic path segments
pub const TOPIC_SEPARATOR: char = '/';

/// Errors raised when parsing a topic path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("Topic name is empty")]
    Empty,

    #[error("Topic '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("Topic '{path}' contains an illegal segment '{segment}'")]
    IllegalSegment { path: String, segment: String },
}

impl From<TopicError> for BusError {
    fn from(err: TopicError) -> Self {
        BusError::InvalidTopic(err.to_string())
    }
}

/// A node in the topic hierarchy
pub struct Topic {
    name: String,
    qualified_name: String,
    parent: Weak<Topic>,
    children: Mutex<HashMap<String, Arc<Topic>>>,
}

impl Topic {
    /// Create a root topic (the namespace root owned by the bus)
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(Self {
            name: String::new(),
            qualified_name: String::new(),
            parent: Weak::new(),
            children: Mutex::new(HashMap::new()),
        })
    }

    /// The last segment of this topic's path
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `/` joined path from the root (the root itself is empty)
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn parent(&self) -> Option<Arc<Topic>> {
        self.parent.upgrade()
    }

    pub fn is_root(&self) -> bool {
        self.parent.upgrade().is_none()
    }

    /// Names of the direct children created so far
    pub fn children(&self) -> Vec<String> {
        let mut names: Vec<_> = self.children.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether `self` is `other` or one of its ancestors
    pub fn is_ancestor_of(self: &Arc<Self>, other: &Arc<Topic>) -> bool {
        let mut current = Some(Arc::clone(other));
        while let Some(topic) = current {
            if Arc::ptr_eq(self, &topic) {
                return true;
            }
            current = topic.parent();
        }
        false
    }

    /// Create (or acquire) the topic at `path` below this one.
    ///
    /// Every segment is validated before any node is created.
    pub fn create(self: &Arc<Self>, path: &str) -> Result<Arc<Topic>, TopicError> {
        if path.is_empty() {
            return Err(TopicError::Empty);
        }
        let segments: Vec<&str> = path.split(TOPIC_SEPARATOR).collect();
        for segment in &segments {
            if segment.is_empty() {
                return Err(TopicError::EmptySegment(path.to_string()));
            }
            if !is_valid_topic_segment(segment) {
                return Err(TopicError::IllegalSegment {
                    path: path.to_string(),
                    segment: segment.to_string(),
                });
            }
        }

        let mut node = Arc::clone(self);
        for segment in segments {
            node = node.child(segment);
        }
        Ok(node)
    }

    /// Get or create a direct child (check-then-create under this node's lock)
    fn child(self: &Arc<Self>, name: &str) -> Arc<Topic> {
        let mut children = self.children.lock();
        if let Some(existing) = children.get(name) {
            return Arc::clone(existing);
        }
        let qualified_name = if self.qualified_name.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", self.qualified_name, TOPIC_SEPARATOR, name)
        };
        let child = Arc::new(Topic {
            name: name.to_string(),
            qualified_name,
            parent: Arc::downgrade(self),
            children: Mutex::new(HashMap::new()),
        });
        children.insert(name.to_string(), Arc::clone(&child));
        child
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("qualified_name", &self.qualified_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_memoized() {
        let root = Topic::root();
        let first = root.create("a/b").unwrap();
        let second = root.create("a/b").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_create_relative_to_child() {
        let root = Topic::root();
        let a = root.create("a").unwrap();
        let via_child = a.create("b/c").unwrap();
        let via_root = root.create("a/b/c").unwrap();
        assert!(Arc::ptr_eq(&via_child, &via_root));
        assert_eq!(via_root.qualified_name(), "a/b/c");
        assert_eq!(via_root.name(), "c");
    }

    #[test]
    fn test_invalid_paths() {
        let root = Topic::root();
        assert_eq!(root.create(""), Err(TopicError::Empty));
        assert!(matches!(root.create("a//b"), Err(TopicError::EmptySegment(_))));
        assert!(matches!(
            root.create("a/ /b"),
            Err(TopicError::IllegalSegment { .. })
        ));
        assert!(matches!(root.create("a/b/"), Err(TopicError::EmptySegment(_))));
        // Nothing is created when validation fails part way along the path
        assert!(root.children().is_empty());
    }

    #[test]
    fn test_parent_chain() {
        let root = Topic::root();
        let leaf = root.create("x/y/z").unwrap();
        let parent = leaf.parent().unwrap();
        assert_eq!(parent.qualified_name(), "x/y");
        assert!(root.is_ancestor_of(&leaf));
        assert!(parent.is_ancestor_of(&leaf));
        assert!(!leaf.is_ancestor_of(&parent));
        assert!(root.is_root());
    }

    #[test]
    fn test_concurrent_create_yields_one_node() {
        let root = Topic::root();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let root = Arc::clone(&root);
                std::thread::spawn(move || root.create("shared/path/leaf").unwrap())
            })
            .collect();
        let topics: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for topic in &topics[1..] {
            assert!(Arc::ptr_eq(&topics[0], topic));
        }
    }
}
