//! Build specification documents.
//!
//! The build specification is the contract with the external build executor.
//! Its YAML shape is fixed:
//!
//! ```yaml
//! version: 1
//! frontend:
//!   phases:
//!     preBuild:
//!       commands: [...]
//!     build:
//!       commands: [...]
//!     postBuild:
//!       commands: [...]
//!   artifacts:
//!     baseDirectory: .next
//!     files: ["**/*"]
//!   cache:
//!     paths: [...]
//! ```
//!
//! Commands run in listed order. `preBuild`, `postBuild` and `cache` are
//! omitted when empty.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The only build specification version the executor understands.
pub const BUILD_SPEC_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub version: u32,
    pub frontend: Frontend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frontend {
    pub phases: Phases,
    pub artifacts: Artifacts,
    #[serde(default, skip_serializing_if = "Cache::is_empty")]
    pub cache: Cache,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phases {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_build: Option<Phase>,
    pub build: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_build: Option<Phase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    pub base_directory: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {
    pub paths: Vec<String>,
}

impl Cache {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl BuildSpec {
    pub fn builder() -> BuildSpecBuilder {
        BuildSpecBuilder::new()
    }

    pub fn pre_build_commands(&self) -> &[String] {
        self.frontend
            .phases
            .pre_build
            .as_ref()
            .map(|p| p.commands.as_slice())
            .unwrap_or_default()
    }

    pub fn build_commands(&self) -> &[String] {
        &self.frontend.phases.build.commands
    }

    pub fn post_build_commands(&self) -> &[String] {
        self.frontend
            .phases
            .post_build
            .as_ref()
            .map(|p| p.commands.as_slice())
            .unwrap_or_default()
    }

    /// Check the document against what the executor accepts.
    pub fn validate(&self) -> Result<()> {
        if self.version != BUILD_SPEC_VERSION {
            return Err(Error::InvalidBuildSpec(format!(
                "unsupported version {} (expected {})",
                self.version, BUILD_SPEC_VERSION
            )));
        }

        if self.build_commands().is_empty() {
            return Err(Error::InvalidBuildSpec(
                "build phase has no commands".to_string(),
            ));
        }

        let phases = [
            ("preBuild", self.frontend.phases.pre_build.as_ref()),
            ("build", Some(&self.frontend.phases.build)),
            ("postBuild", self.frontend.phases.post_build.as_ref()),
        ];
        for (name, phase) in phases {
            let Some(phase) = phase else { continue };
            if phase.commands.is_empty() {
                return Err(Error::InvalidBuildSpec(format!(
                    "{} phase is declared without commands",
                    name
                )));
            }
            if let Some(index) = phase.commands.iter().position(|c| c.trim().is_empty()) {
                return Err(Error::InvalidBuildSpec(format!(
                    "{} command #{} is blank",
                    name,
                    index + 1
                )));
            }
        }

        let artifacts = &self.frontend.artifacts;
        if artifacts.base_directory.trim().is_empty() {
            return Err(Error::InvalidBuildSpec(
                "artifacts base directory is empty".to_string(),
            ));
        }
        if artifacts.files.is_empty() {
            return Err(Error::InvalidBuildSpec(
                "artifacts declare no files".to_string(),
            ));
        }
        if artifacts.files.iter().any(|f| f.trim().is_empty()) {
            return Err(Error::InvalidBuildSpec(
                "artifacts contain a blank file glob".to_string(),
            ));
        }

        if self.frontend.cache.paths.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::InvalidBuildSpec(
                "cache contains a blank path".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate and encode as the YAML document handed to the executor.
    pub fn to_yaml(&self) -> Result<String> {
        self.validate()?;
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Builder for [`BuildSpec`]. Validation happens in [`BuildSpecBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuildSpecBuilder {
    version: u32,
    pre_build: Vec<String>,
    build: Vec<String>,
    post_build: Vec<String>,
    base_directory: String,
    files: Vec<String>,
    cache_paths: Vec<String>,
}

impl BuildSpecBuilder {
    pub fn new() -> Self {
        Self {
            version: BUILD_SPEC_VERSION,
            pre_build: Vec::new(),
            build: Vec::new(),
            post_build: Vec::new(),
            base_directory: String::new(),
            files: Vec::new(),
            cache_paths: Vec::new(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn pre_build<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_build.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn build_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn post_build<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.post_build.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn artifacts<I, S>(mut self, base_directory: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_directory = base_directory.into();
        self.files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn cache_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<BuildSpec> {
        let optional = |commands: Vec<String>| {
            if commands.is_empty() {
                None
            } else {
                Some(Phase { commands })
            }
        };

        let spec = BuildSpec {
            version: self.version,
            frontend: Frontend {
                phases: Phases {
                    pre_build: optional(self.pre_build),
                    build: Phase {
                        commands: self.build,
                    },
                    post_build: optional(self.post_build),
                },
                artifacts: Artifacts {
                    base_directory: self.base_directory,
                    files: self.files,
                },
                cache: Cache {
                    paths: self.cache_paths,
                },
            },
        };
        spec.validate()?;
        Ok(spec)
    }
}

impl Default for BuildSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_spec() -> BuildSpec {
        BuildSpec::builder()
            .pre_build(["ls", "yarn cache clean", "yarn install"])
            .build_commands(["yarn build"])
            .artifacts(".next", ["**/*"])
            .cache_paths(["node_modules/**/*"])
            .build()
            .unwrap()
    }

    fn strings(value: &serde_yaml::Value) -> Vec<&str> {
        value
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_yaml_shape_and_command_order() {
        let yaml = next_spec().to_yaml().unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(doc["version"].as_u64(), Some(1));
        let frontend = &doc["frontend"];
        assert_eq!(
            strings(&frontend["phases"]["preBuild"]["commands"]),
            vec!["ls", "yarn cache clean", "yarn install"]
        );
        assert_eq!(
            strings(&frontend["phases"]["build"]["commands"]),
            vec!["yarn build"]
        );
        assert!(frontend["phases"].get("postBuild").is_none());
        assert_eq!(frontend["artifacts"]["baseDirectory"].as_str(), Some(".next"));
        assert_eq!(strings(&frontend["artifacts"]["files"]), vec!["**/*"]);
        assert_eq!(strings(&frontend["cache"]["paths"]), vec!["node_modules/**/*"]);
    }

    #[test]
    fn test_top_level_key_order() {
        let yaml = next_spec().to_yaml().unwrap();
        let version = yaml.find("version:").unwrap();
        let pre_build = yaml.find("preBuild:").unwrap();
        let build = yaml.find("build:\n").unwrap();
        let artifacts = yaml.find("artifacts:").unwrap();
        let cache = yaml.find("cache:").unwrap();
        assert!(version < pre_build);
        assert!(pre_build < artifacts);
        assert!(build < artifacts);
        assert!(artifacts < cache);
    }

    #[test]
    fn test_empty_build_phase_rejected() {
        let err = BuildSpec::builder()
            .pre_build(["npm ci"])
            .artifacts("dist", ["**/*"])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBuildSpec(_)));
    }

    #[test]
    fn test_blank_command_rejected() {
        let err = BuildSpec::builder()
            .pre_build(["npm ci", "   "])
            .build_commands(["npm run build"])
            .artifacts("dist", ["**/*"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("preBuild command #2 is blank"));
    }

    #[test]
    fn test_missing_artifacts_rejected() {
        let no_dir = BuildSpec::builder()
            .build_commands(["npm run build"])
            .artifacts("", ["**/*"])
            .build();
        assert!(matches!(no_dir, Err(Error::InvalidBuildSpec(_))));

        let no_files = BuildSpec::builder()
            .build_commands(["npm run build"])
            .artifacts("dist", Vec::<String>::new())
            .build();
        assert!(matches!(no_files, Err(Error::InvalidBuildSpec(_))));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let err = BuildSpec::builder()
            .version(2)
            .build_commands(["npm run build"])
            .artifacts("dist", ["**/*"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unsupported version 2"));
    }

    #[test]
    fn test_hand_built_empty_pre_build_rejected() {
        let mut spec = next_spec();
        spec.frontend.phases.pre_build = Some(Phase {
            commands: Vec::new(),
        });
        assert!(spec.to_yaml().is_err());
    }

    #[test]
    fn test_optional_sections_omitted() {
        let spec = BuildSpec::builder()
            .build_commands(["hugo"])
            .post_build(["echo done"])
            .artifacts("public", ["**/*"])
            .build()
            .unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&spec.to_yaml().unwrap()).unwrap();
        assert!(doc["frontend"]["phases"].get("preBuild").is_none());
        assert!(doc["frontend"].get("cache").is_none());
        assert_eq!(
            strings(&doc["frontend"]["phases"]["postBuild"]["commands"]),
            vec!["echo done"]
        );
        assert!(spec.pre_build_commands().is_empty());
    }
}
