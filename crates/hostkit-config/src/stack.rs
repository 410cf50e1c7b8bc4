//! Stack configuration parsing.
//!
//! A configuration file declares one `stack`, one `app` and optionally the
//! `output` carrying the branch URL. String values are interpolated after the
//! stack node is read, so `${stack.name}` and friends are available everywhere
//! except inside the stack node itself.

use crate::{ConfigError, ConfigResult, VariableContext};
use hostkit_core::application::{Branch, BranchStage, GitProvider, Platform, SourceProvider};
use hostkit_core::buildspec::{BUILD_SPEC_VERSION, BuildSpec};
use hostkit_core::hosting::{
    DEFAULT_COMPUTE_ROLE_ID, DEFAULT_ROLE_DESCRIPTION, DEFAULT_ROLE_ID, OutputConfig, RoleConfig,
};
use hostkit_core::iam::{Effect, PolicyStatement};
use hostkit_core::secret::SecretRef;
use hostkit_core::{App, HostingConfig, Stack, StackOptions, TemplateFormat};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// A parsed configuration, ready to be assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDefinition {
    pub id: String,
    pub options: StackOptions,
    pub hosting: HostingConfig,
}

impl StackDefinition {
    /// Assemble the hosting stack described by this definition into `app`.
    pub fn assemble<'a>(&self, app: &'a mut App) -> hostkit_core::Result<&'a Stack> {
        hostkit_core::build(app, &self.id, self.options.clone(), &self.hosting)
    }
}

/// Parse a stack configuration from KDL text.
///
/// Region and account already present in `vars` take precedence over the
/// ones in the file.
pub fn parse_stack_config(kdl: &str, vars: &VariableContext) -> ConfigResult<StackDefinition> {
    let doc: KdlDocument = kdl.parse()?;

    for node in doc.nodes() {
        match node.name().value() {
            "stack" | "app" | "output" => {}
            other => warn!(node = other, "Ignoring unknown configuration node"),
        }
    }

    let stack_node =
        single_node(&doc, "stack")?.ok_or_else(|| ConfigError::MissingField("stack".to_string()))?;
    let app_node =
        single_node(&doc, "app")?.ok_or_else(|| ConfigError::MissingField("app".to_string()))?;
    let output_node = single_node(&doc, "output")?;

    let (id, mut options) = parse_stack(NodeReader::new(stack_node, vars))?;
    if let Some(region) = &vars.stack.region {
        options.region = Some(region.clone());
    }
    if let Some(account) = &vars.stack.account {
        options.account = Some(account.clone());
    }

    let mut ctx = vars.clone();
    ctx.stack.name = id.clone();
    ctx.stack.region = options.region.clone();
    ctx.stack.account = options.account.clone();

    let mut hosting = parse_app(NodeReader::new(app_node, &ctx))?;
    if let Some(node) = output_node {
        hosting.output = parse_output(NodeReader::new(node, &ctx))?;
    }

    debug!(
        stack = %id,
        app = %hosting.app_id,
        region = ?options.region,
        "Parsed stack configuration"
    );

    Ok(StackDefinition {
        id,
        options,
        hosting,
    })
}

/// Read and parse a stack configuration file.
pub fn load_stack_config(path: &Path, vars: &VariableContext) -> ConfigResult<StackDefinition> {
    let content = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), "Read stack configuration");
    parse_stack_config(&content, vars)
}

fn single_node<'a>(doc: &'a KdlDocument, name: &str) -> ConfigResult<Option<&'a KdlNode>> {
    let mut matches = doc.nodes().iter().filter(|n| n.name().value() == name);
    let first = matches.next();
    if matches.next().is_some() {
        return Err(ConfigError::Duplicate(format!(
            "only one '{}' node is allowed",
            name
        )));
    }
    Ok(first)
}

fn parse_stack(node: NodeReader<'_>) -> ConfigResult<(String, StackOptions)> {
    let id = node.required_arg("stack name")?;
    let mut options = StackOptions::default();

    for child in node.children() {
        match child.name() {
            "region" => options.region = Some(child.required_arg("stack region")?),
            "account" => options.account = Some(child.required_arg("stack account")?),
            "description" => options.description = Some(child.required_arg("stack description")?),
            "format" => {
                options.format = parse_value::<TemplateFormat>(
                    "stack format",
                    &child.required_arg("stack format")?,
                )?
            }
            other => warn!(node = other, stack = %id, "Ignoring unknown stack setting"),
        }
    }

    Ok((id, options))
}

fn parse_app(node: NodeReader<'_>) -> ConfigResult<HostingConfig> {
    let app_id = node.required_arg("app name")?;

    let mut description = None;
    let mut platform = None;
    let mut auto_branch_deletion = None;
    let mut repository = None;
    let mut token = None;
    let mut role = None;
    let mut compute_role = None;
    let mut managed_policies = Vec::new();
    let mut statements = Vec::new();
    let mut env = BTreeMap::new();
    let mut build_spec = None;
    let mut branch = None;

    for child in node.children() {
        match child.name() {
            "description" => description = Some(child.required_arg("app description")?),
            "platform" => {
                platform = Some(parse_value::<Platform>(
                    "platform",
                    &child.required_arg("platform")?,
                )?)
            }
            "auto-branch-deletion" => {
                auto_branch_deletion = Some(child.required_bool("auto-branch-deletion")?)
            }
            "repository" => repository = Some(child),
            "oauth-token" => token = Some(parse_secret(&child)?),
            "role" => role = Some(parse_role(&child, DEFAULT_ROLE_ID)?),
            "compute-role" => compute_role = Some(parse_compute_role(&child)?),
            "managed-policy" => {
                let names = child.args()?;
                if names.is_empty() {
                    return Err(ConfigError::MissingField("managed policy name".to_string()));
                }
                managed_policies.extend(names);
            }
            "policy-statement" => statements.push(parse_statement(&child)?),
            "env" => {
                for var in child.children() {
                    let value = var.required_arg("environment variable value")?;
                    env.insert(var.name().to_string(), value);
                }
            }
            "build-spec" => build_spec = Some(parse_build_spec(&child)?),
            "branch" => {
                if branch.is_some() {
                    return Err(ConfigError::Duplicate(format!(
                        "app '{}' declares more than one branch",
                        app_id
                    )));
                }
                branch = Some(parse_branch(&child)?);
            }
            other => warn!(node = other, app = %app_id, "Ignoring unknown app setting"),
        }
    }

    let token = token.ok_or_else(|| ConfigError::MissingField("oauth-token".to_string()))?;
    let source = match repository {
        Some(repo) => parse_repository(&repo, token)?,
        None => return Err(ConfigError::MissingField("repository".to_string())),
    };
    let build_spec =
        build_spec.ok_or_else(|| ConfigError::MissingField("build-spec".to_string()))?;
    let branch = branch.ok_or_else(|| ConfigError::MissingField("branch".to_string()))?;

    let mut config = HostingConfig::new(app_id, source, build_spec, branch);
    config.app_description = description;
    config.environment_variables = env;
    config.statements = statements;
    if let Some(platform) = platform {
        config.platform = platform;
    }
    if let Some(auto) = auto_branch_deletion {
        config.auto_branch_deletion = auto;
    }
    if let Some(role) = role {
        config.role = role;
    }
    if !managed_policies.is_empty() {
        config.managed_policies = managed_policies;
    }
    // Without an explicit node the compute role follows the platform.
    config.compute_role = match compute_role {
        Some(explicit) => explicit,
        None if config.platform.supports_compute_role() => {
            Some(RoleConfig::new(DEFAULT_COMPUTE_ROLE_ID))
        }
        None => None,
    };

    Ok(config)
}

fn parse_repository(node: &NodeReader<'_>, token: SecretRef) -> ConfigResult<SourceProvider> {
    let provider = match node.prop("provider") {
        Some(provider) => parse_value::<GitProvider>("repository provider", &provider)?,
        None => GitProvider::default(),
    };
    let owner = node
        .prop("owner")
        .ok_or_else(|| ConfigError::MissingField("repository owner".to_string()))?;
    let name = node
        .prop("name")
        .ok_or_else(|| ConfigError::MissingField("repository name".to_string()))?;

    Ok(SourceProvider::new(provider, owner, name, token)?)
}

fn parse_secret(node: &NodeReader<'_>) -> ConfigResult<SecretRef> {
    let path = node
        .prop("secret")
        .or_else(|| node.first_arg())
        .ok_or_else(|| ConfigError::MissingField("oauth-token secret".to_string()))?;
    let mut secret = SecretRef::secrets_manager(path)?;
    if let Some(field) = node.prop("field") {
        secret = secret.with_json_field(field);
    }
    Ok(secret)
}

fn parse_role(node: &NodeReader<'_>, default_id: &str) -> ConfigResult<RoleConfig> {
    let id = node.first_arg().unwrap_or_else(|| default_id.to_string());
    let mut role = RoleConfig::new(id);
    match node.prop("description") {
        Some(description) => role = role.with_description(description),
        None if role.id == DEFAULT_ROLE_ID => {
            role = role.with_description(DEFAULT_ROLE_DESCRIPTION)
        }
        None => {}
    }
    Ok(role)
}

/// `compute-role #false` disables the role, `compute-role "Id"` names it.
fn parse_compute_role(node: &NodeReader<'_>) -> ConfigResult<Option<RoleConfig>> {
    if let Some(enabled) = node.first_bool() {
        return Ok(enabled.then(|| RoleConfig::new(DEFAULT_COMPUTE_ROLE_ID)));
    }
    Ok(Some(parse_role(node, DEFAULT_COMPUTE_ROLE_ID)?))
}

fn parse_statement(node: &NodeReader<'_>) -> ConfigResult<PolicyStatement> {
    let mut builder = PolicyStatement::builder();
    if let Some(effect) = node.prop("effect") {
        builder = builder.effect(parse_value::<Effect>("policy effect", &effect)?);
    }

    for child in node.children() {
        match child.name() {
            "action" => {
                for action in child.args()? {
                    builder = builder.action(action);
                }
            }
            "resource" => {
                for resource in child.args()? {
                    builder = builder.resource(resource);
                }
            }
            other => warn!(node = other, "Ignoring unknown policy statement setting"),
        }
    }

    Ok(builder.build()?)
}

fn parse_build_spec(node: &NodeReader<'_>) -> ConfigResult<BuildSpec> {
    let version = match node.integer_prop("version")? {
        Some(v) => u32::try_from(v).map_err(|_| ConfigError::InvalidValue {
            field: "build-spec version".to_string(),
            message: format!("{} is out of range", v),
        })?,
        None => BUILD_SPEC_VERSION,
    };

    let mut builder = BuildSpec::builder().version(version);
    for child in node.children() {
        match child.name() {
            "pre-build" => builder = builder.pre_build(child.args()?),
            "build" => builder = builder.build_commands(child.args()?),
            "post-build" => builder = builder.post_build(child.args()?),
            "artifacts" => {
                let base_directory = child.prop("base-directory").ok_or_else(|| {
                    ConfigError::MissingField("artifacts base-directory".to_string())
                })?;
                let mut files = Vec::new();
                for list in child.children().filter(|c| c.name() == "files") {
                    files.extend(list.args()?);
                }
                builder = builder.artifacts(base_directory, files);
            }
            "cache" => builder = builder.cache_paths(child.args()?),
            other => warn!(node = other, "Ignoring unknown build-spec setting"),
        }
    }

    Ok(builder.build()?)
}

fn parse_branch(node: &NodeReader<'_>) -> ConfigResult<Branch> {
    let name = node.required_arg("branch name")?;
    let mut branch = Branch::new(name)?;
    if let Some(stage) = node.prop("stage") {
        branch = branch.with_stage(parse_value::<BranchStage>("branch stage", &stage)?);
    }
    Ok(branch)
}

fn parse_output(node: NodeReader<'_>) -> ConfigResult<OutputConfig> {
    let mut output = OutputConfig::default();
    if let Some(id) = node.first_arg() {
        output.id = id;
    }
    if let Some(description) = node.prop("description") {
        output.description = Some(description);
    }
    Ok(output)
}

fn parse_value<T>(field: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr<Err = String>,
{
    value.parse().map_err(|message| ConfigError::InvalidValue {
        field: field.to_string(),
        message,
    })
}

// Node access with interpolation applied to every string value.

#[derive(Clone, Copy)]
struct NodeReader<'a> {
    node: &'a KdlNode,
    vars: &'a VariableContext,
}

impl<'a> NodeReader<'a> {
    fn new(node: &'a KdlNode, vars: &'a VariableContext) -> Self {
        Self { node, vars }
    }

    fn name(&self) -> &'a str {
        self.node.name().value()
    }

    fn positional(self) -> impl Iterator<Item = &'a KdlValue> + 'a {
        self.node
            .entries()
            .iter()
            .filter(|e| e.name().is_none())
            .map(|e| e.value())
    }

    fn first_arg(&self) -> Option<String> {
        self.positional()
            .next()
            .and_then(|v| v.as_string())
            .map(|s| self.vars.interpolate(s))
    }

    /// Positional string arguments. Any other argument type is an error.
    fn args(&self) -> ConfigResult<Vec<String>> {
        self.positional()
            .map(|v| match v.as_string() {
                Some(s) => Ok(self.vars.interpolate(s)),
                None => Err(ConfigError::InvalidValue {
                    field: self.name().to_string(),
                    message: format!("expected a string, got {}", v),
                }),
            })
            .collect()
    }

    fn first_bool(&self) -> Option<bool> {
        self.positional().next().and_then(|v| v.as_bool())
    }

    fn required_arg(&self, field: &str) -> ConfigResult<String> {
        self.first_arg()
            .ok_or_else(|| ConfigError::MissingField(field.to_string()))
    }

    fn required_bool(&self, field: &str) -> ConfigResult<bool> {
        self.first_bool().ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected #true or #false".to_string(),
        })
    }

    fn prop(&self, name: &str) -> Option<String> {
        self.node
            .get(name)
            .and_then(|v| v.as_string())
            .map(|s| self.vars.interpolate(s))
    }

    fn integer_prop(&self, name: &str) -> ConfigResult<Option<i128>> {
        match self.node.get(name) {
            None => Ok(None),
            Some(value) => value.as_integer().map(Some).ok_or_else(|| {
                ConfigError::InvalidValue {
                    field: format!("{} {}", self.name(), name),
                    message: format!("expected an integer, got {}", value),
                }
            }),
        }
    }

    fn children(self) -> impl Iterator<Item = NodeReader<'a>> + 'a {
        let vars = self.vars;
        self.node
            .children()
            .map(|doc| doc.nodes())
            .unwrap_or_default()
            .iter()
            .map(move |node| NodeReader::new(node, vars))
    }
}
