//! Hosted application and branch resources.
//!
//! A hosted application is a platform-managed web app linked to a source
//! repository. It builds with an embedded [`BuildSpec`] and serves one
//! deployment per registered [`Branch`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::buildspec::BuildSpec;
use crate::secret::SecretRef;
use crate::token::Expr;
use crate::{Error, Result};

/// Domain suffix under which every branch deployment is published.
pub const PLATFORM_DOMAIN: &str = "amplifyapp.com";

/// Attribute carrying the identifier the platform assigns to an application.
pub const APP_ID_ATTRIBUTE: &str = "AppId";

/// Hosting mode of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    /// Static site.
    #[default]
    Web,
    /// Server-side rendered application.
    WebCompute,
    /// Legacy server-side rendering.
    WebDynamic,
}

impl Platform {
    /// Whether the platform runs server-side code under a compute role.
    pub fn supports_compute_role(&self) -> bool {
        matches!(self, Platform::WebCompute)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Web => write!(f, "WEB"),
            Platform::WebCompute => write!(f, "WEB_COMPUTE"),
            Platform::WebDynamic => write!(f, "WEB_DYNAMIC"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "WEB" => Ok(Platform::Web),
            "WEB_COMPUTE" => Ok(Platform::WebCompute),
            "WEB_DYNAMIC" => Ok(Platform::WebDynamic),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

/// Source control host a repository lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
    #[default]
    Github,
    Gitlab,
}

impl GitProvider {
    fn base_url(&self) -> &'static str {
        match self {
            GitProvider::Github => "https://github.com",
            GitProvider::Gitlab => "https://gitlab.com",
        }
    }
}

impl std::fmt::Display for GitProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitProvider::Github => write!(f, "github"),
            GitProvider::Gitlab => write!(f, "gitlab"),
        }
    }
}

impl std::str::FromStr for GitProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(GitProvider::Github),
            "gitlab" => Ok(GitProvider::Gitlab),
            _ => Err(format!("Unknown git provider: {}", s)),
        }
    }
}

/// The repository an application builds from, with a reference to the token
/// the platform uses to pull it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProvider {
    pub provider: GitProvider,
    pub owner: String,
    pub repository: String,
    pub token: SecretRef,
}

impl SourceProvider {
    pub fn new(
        provider: GitProvider,
        owner: impl Into<String>,
        repository: impl Into<String>,
        token: SecretRef,
    ) -> Result<Self> {
        let owner = owner.into();
        let repository = repository.into();
        if owner.trim().is_empty() {
            return Err(Error::MissingField("repository owner".to_string()));
        }
        if repository.trim().is_empty() {
            return Err(Error::MissingField("repository name".to_string()));
        }
        Ok(Self {
            provider,
            owner,
            repository,
            token,
        })
    }

    pub fn url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.provider.base_url(),
            self.owner,
            self.repository
        )
    }
}

/// Deployment stage of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BranchStage {
    Production,
    Beta,
    Development,
    Experimental,
    PullRequest,
}

impl std::str::FromStr for BranchStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "PRODUCTION" => Ok(BranchStage::Production),
            "BETA" => Ok(BranchStage::Beta),
            "DEVELOPMENT" => Ok(BranchStage::Development),
            "EXPERIMENTAL" => Ok(BranchStage::Experimental),
            "PULL_REQUEST" => Ok(BranchStage::PullRequest),
            _ => Err(format!("Unknown branch stage: {}", s)),
        }
    }
}

/// A deployable branch of the application's repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub stage: Option<BranchStage>,
}

impl Branch {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_branch_name(&name)?;
        Ok(Self { name, stage: None })
    }

    pub fn with_stage(mut self, stage: BranchStage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Host label of the branch deployment; `/` is not valid in a hostname.
    pub fn subdomain(&self) -> String {
        self.name.replace('/', "-")
    }

    /// Public URL of this branch's deployment, deferred on the application id.
    pub fn url(&self, app_id: Expr) -> Expr {
        Expr::concat([
            Expr::literal(format!("https://{}.", self.subdomain())),
            app_id,
            Expr::literal(format!(".{}", PLATFORM_DOMAIN)),
        ])
    }

    pub fn to_properties(&self, app_id: Expr) -> BranchProperties {
        BranchProperties {
            app_id,
            branch_name: self.name.clone(),
            enable_auto_build: true,
            enable_pull_request_preview: true,
            stage: self.stage,
        }
    }
}

/// Branch names become part of a hostname and a git ref.
fn validate_branch_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::MissingField("branch name".to_string()));
    }
    if name.chars().any(char::is_whitespace) || name.contains("..") {
        return Err(Error::InvalidInput(format!(
            "invalid branch name '{}'",
            name
        )));
    }
    Ok(())
}

/// A hosted application before it is placed in a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedApp {
    pub id: String,
    pub description: Option<String>,
    pub source: SourceProvider,
    pub platform: Platform,
    pub auto_branch_deletion: bool,
    pub build_spec: BuildSpec,
    pub environment_variables: BTreeMap<String, String>,
}

impl HostedApp {
    /// Check the cross-field rules the platform enforces.
    pub fn validate(&self, has_compute_role: bool) -> Result<()> {
        self.build_spec.validate()?;
        if has_compute_role && !self.platform.supports_compute_role() {
            return Err(Error::InvalidInput(format!(
                "application '{}' has a compute role but platform {} cannot use it (requires {})",
                self.id,
                self.platform,
                Platform::WebCompute
            )));
        }
        Ok(())
    }

    /// Render the resource properties. Role ARNs are deferred references to
    /// roles already placed in the stack.
    pub fn to_properties(
        &self,
        service_role_arn: Expr,
        compute_role_arn: Option<Expr>,
    ) -> Result<AppProperties> {
        self.validate(compute_role_arn.is_some())?;
        Ok(AppProperties {
            name: self.id.clone(),
            description: self.description.clone(),
            repository: self.source.url(),
            oauth_token: self.source.token.to_expr(),
            iam_service_role: service_role_arn,
            compute_role_arn,
            platform: self.platform,
            build_spec: self.build_spec.to_yaml()?,
            enable_branch_auto_deletion: self.auto_branch_deletion,
            environment_variables: self
                .environment_variables
                .iter()
                .map(|(name, value)| EnvironmentVariable {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppProperties {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub repository: String,
    pub oauth_token: Expr,
    #[serde(rename = "IAMServiceRole")]
    pub iam_service_role: Expr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_role_arn: Option<Expr>,
    pub platform: Platform,
    pub build_spec: String,
    pub enable_branch_auto_deletion: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment_variables: Vec<EnvironmentVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BranchProperties {
    pub app_id: Expr,
    pub branch_name: String,
    pub enable_auto_build: bool,
    pub enable_pull_request_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<BranchStage>,
}
