//! Construct paths and the logical identifiers derived from them.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of hex digits of the path hash appended to a logical id.
const HASH_LEN: usize = 8;

/// Logical ids are capped by the template format at 255 characters.
const MAX_ID_LEN: usize = 255;

const MAX_HUMAN_LEN: usize = 240;

/// Component dropped from a path before an id is derived, hash included.
const HIDDEN_ID: &str = "Default";

/// Component left out of the human-readable part of an id only.
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";

/// The key of a resource or output in a synthesized template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct LogicalId(String);

impl LogicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Position of a construct inside a stack, e.g. `NextApp/main/Resource`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstructPath(Vec<String>);

impl ConstructPath {
    /// Start a path at a top-level construct of a stack.
    pub fn root(id: &str) -> Result<Self> {
        validate_construct_id(id)?;
        Ok(Self(vec![id.to_string()]))
    }

    /// Extend the path with a child construct id.
    pub fn child(&self, id: &str) -> Result<Self> {
        validate_construct_id(id)?;
        let mut components = self.0.clone();
        components.push(id.to_string());
        Ok(Self(components))
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Derive the template logical id for this path.
    ///
    /// `Default` components are dropped first. A remaining top-level id keeps
    /// only its alphanumeric characters. Deeper paths concatenate the
    /// alphanumerics of every component except `Resource` and append the
    /// first 8 upper-hex digits of the MD5 of the `/`-joined path, so two
    /// paths never collapse to the same id.
    pub fn logical_id(&self) -> Result<LogicalId> {
        let components: Vec<&str> = self
            .0
            .iter()
            .map(String::as_str)
            .filter(|c| *c != HIDDEN_ID)
            .collect();

        if let [only] = components.as_slice() {
            let top_level = alphanumeric(only);
            if top_level.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "construct id '{}' has no alphanumeric characters",
                    only
                )));
            }
            if top_level.len() <= MAX_ID_LEN {
                return Ok(LogicalId(top_level));
            }
        }
        if components.is_empty() {
            return Err(Error::InvalidInput(format!(
                "construct path '{}' has no visible components",
                self
            )));
        }

        let digest = md5::compute(components.join("/"));
        let hash = hex::encode_upper(digest.0);

        let mut human: String = without_repeats(&components)
            .into_iter()
            .filter(|c| *c != HIDDEN_FROM_HUMAN_ID)
            .map(alphanumeric)
            .collect();
        human.truncate(MAX_HUMAN_LEN);

        Ok(LogicalId(format!("{}{}", human, &hash[..HASH_LEN])))
    }
}

fn alphanumeric(component: &str) -> String {
    component.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Drop components already spelled out by the end of their predecessor,
/// e.g. `Bucket/Bucket` reads as `Bucket` once.
fn without_repeats<'a>(components: &[&'a str]) -> Vec<&'a str> {
    let mut kept: Vec<&'a str> = Vec::new();
    for component in components {
        match kept.last() {
            Some(last) if last.ends_with(component) => {}
            _ => kept.push(*component),
        }
    }
    kept
}

impl std::fmt::Display for ConstructPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Construct ids must be non-empty and may not contain the path separator.
pub fn validate_construct_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::InvalidInput("construct id must not be empty".to_string()));
    }
    if id.contains('/') {
        return Err(Error::InvalidInput(format!(
            "construct id '{}' must not contain '/'",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_id_unchanged() {
        let path = ConstructPath::root("AmplifyAppUrl").unwrap();
        assert_eq!(path.logical_id().unwrap().as_str(), "AmplifyAppUrl");
    }

    #[test]
    fn test_top_level_id_strips_punctuation() {
        let path = ConstructPath::root("amplify-app.url").unwrap();
        assert_eq!(path.logical_id().unwrap().as_str(), "amplifyappurl");
    }

    #[test]
    fn test_top_level_id_without_alphanumerics_rejected() {
        let path = ConstructPath::root("-.-").unwrap();
        assert!(matches!(path.logical_id(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_ids_match_deployed_stack() {
        let id = |parts: &[&str]| {
            let mut path = ConstructPath::root(parts[0]).unwrap();
            for part in &parts[1..] {
                path = path.child(part).unwrap();
            }
            path.logical_id().unwrap().to_string()
        };

        assert_eq!(id(&["AmplifyRole", "Resource"]), "AmplifyRole7A8FD9BC");
        assert_eq!(id(&["NextApp", "Resource"]), "NextApp117D4B8F");
        assert_eq!(id(&["NextApp", "main", "Resource"]), "NextAppmainAB5362D6");
        assert_eq!(
            id(&["ComputeAmplifyRole", "Resource"]),
            "ComputeAmplifyRole40245DD7"
        );
    }

    #[test]
    fn test_default_component_dropped_from_hash() {
        let with_default = ConstructPath::root("a")
            .unwrap()
            .child("Default")
            .unwrap()
            .child("b")
            .unwrap();
        let plain = ConstructPath::root("a").unwrap().child("b").unwrap();
        assert_eq!(
            with_default.logical_id().unwrap(),
            plain.logical_id().unwrap()
        );
        assert_eq!(plain.logical_id().unwrap().as_str(), "abA7E86136");

        let only_default = ConstructPath::root("App").unwrap().child("Default").unwrap();
        assert_eq!(only_default.logical_id().unwrap().as_str(), "App");
    }

    #[test]
    fn test_logical_id_is_deterministic() {
        let a = ConstructPath::root("NextApp").unwrap().child("main").unwrap();
        let b = ConstructPath::root("NextApp").unwrap().child("main").unwrap();
        assert_eq!(a.logical_id().unwrap(), b.logical_id().unwrap());
    }

    #[test]
    fn test_distinct_paths_get_distinct_ids() {
        let a = ConstructPath::root("App").unwrap().child("main").unwrap();
        let b = ConstructPath::root("Appm").unwrap().child("ain").unwrap();
        assert_ne!(a.logical_id().unwrap(), b.logical_id().unwrap());
    }

    #[test]
    fn test_non_alphanumeric_characters_dropped() {
        let path = ConstructPath::root("next-app")
            .unwrap()
            .child("feature_x")
            .unwrap();
        assert!(
            path.logical_id()
                .unwrap()
                .as_str()
                .starts_with("nextappfeaturex")
        );
    }

    #[test]
    fn test_invalid_construct_ids_rejected() {
        assert!(matches!(
            ConstructPath::root(""),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            ConstructPath::root("a/b"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_path_display() {
        let path = ConstructPath::root("NextApp")
            .unwrap()
            .child("main")
            .unwrap()
            .child("Resource")
            .unwrap();
        assert_eq!(path.to_string(), "NextApp/main/Resource");
    }
}
