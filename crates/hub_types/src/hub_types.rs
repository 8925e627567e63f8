//! Hub Types - Shared types for the automation hub
//!
//! This crate holds everything plugins and the server agree on:
//! - The tagged [`Value`] carried by messages and configuration
//! - User object identity ([`UserObject`], [`UserObjectType`], [`ObjectDescription`])
//! - Configuration schemas and their validation

pub mod config;
pub mod object;
pub mod value;

pub use config::*;
pub use object::*;
pub use value::*;

/// Re-exported so plugins name object identities with the same type
pub use uuid::Uuid;

/// Check a single topic path segment (`[A-Za-z0-9_-]+`)
pub fn is_valid_topic_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Check a `/` separated topic path where every segment is valid
pub fn is_valid_topic_path(path: &str) -> bool {
    path.split('/').all(is_valid_topic_segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_segments() {
        assert!(is_valid_topic_segment("kitchen_lights-2"));
        assert!(!is_valid_topic_segment(""));
        assert!(!is_valid_topic_segment(" "));
        assert!(!is_valid_topic_segment("a.b"));
    }

    #[test]
    fn test_topic_paths() {
        assert!(is_valid_topic_path("a/b/c"));
        assert!(!is_valid_topic_path("a//b"));
        assert!(!is_valid_topic_path("a/ /b"));
        assert!(!is_valid_topic_path("/a"));
    }
}
