//! Assembly of the hosted application stack.
//!
//! [`build`] turns a [`HostingConfig`] into one stack holding:
//!
//! - an application role, assumable by the hosting service in both its
//!   global and region-qualified form
//! - a compute role, additionally assumable by the build service
//! - the hosted application with its embedded build specification
//! - one branch
//! - an output carrying the public URL of that branch
//!
//! Nothing here talks to the provider. References between resources are
//! deferred expressions that the reconciler resolves in dependency order.

use std::collections::BTreeMap;
use tracing::info;

use crate::application::{APP_ID_ATTRIBUTE, Branch, HostedApp, Platform, SourceProvider};
use crate::buildspec::BuildSpec;
use crate::iam::{CompositePrincipal, ManagedPolicy, PolicyStatement, Role, ServicePrincipal};
use crate::id::{ConstructPath, LogicalId};
use crate::stack::{App, Resource, Stack, StackOptions};
use crate::token::Expr;
use crate::{Error, Result};

/// Service name of the hosting platform's control plane.
pub const HOSTING_SERVICE: &str = "amplify";

/// Service name of the build executor.
pub const BUILD_SERVICE: &str = "codebuild";

/// Managed policy granted to both roles unless configured otherwise.
pub const DEFAULT_MANAGED_POLICY: &str = "AdministratorAccess";

pub const DEFAULT_ROLE_ID: &str = "AmplifyRole";
pub const DEFAULT_ROLE_DESCRIPTION: &str = "Custom role permitting resources creation from Amplify";
pub const DEFAULT_COMPUTE_ROLE_ID: &str = "ComputeAmplifyRole";
pub const DEFAULT_OUTPUT_ID: &str = "AmplifyAppUrl";
pub const DEFAULT_OUTPUT_DESCRIPTION: &str = "Amplify App URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleConfig {
    pub id: String,
    pub description: Option<String>,
}

impl RoleConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub id: String,
    pub description: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_OUTPUT_ID.to_string(),
            description: Some(DEFAULT_OUTPUT_DESCRIPTION.to_string()),
        }
    }
}

/// Everything that varies between deployments of the hosting stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingConfig {
    /// Construct id of the application, also used as its name.
    pub app_id: String,
    pub app_description: Option<String>,
    pub role: RoleConfig,
    /// Role the application's server-side code and builds run under.
    pub compute_role: Option<RoleConfig>,
    /// Managed policies attached to both roles.
    pub managed_policies: Vec<String>,
    /// Scoped statements attached to both roles.
    pub statements: Vec<PolicyStatement>,
    pub source: SourceProvider,
    pub platform: Platform,
    pub auto_branch_deletion: bool,
    pub build_spec: BuildSpec,
    pub environment_variables: BTreeMap<String, String>,
    pub branch: Branch,
    pub output: OutputConfig,
}

impl HostingConfig {
    /// A configuration with the default role, policy and output settings.
    pub fn new(
        app_id: impl Into<String>,
        source: SourceProvider,
        build_spec: BuildSpec,
        branch: Branch,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_description: None,
            role: RoleConfig::new(DEFAULT_ROLE_ID).with_description(DEFAULT_ROLE_DESCRIPTION),
            compute_role: Some(RoleConfig::new(DEFAULT_COMPUTE_ROLE_ID)),
            managed_policies: vec![DEFAULT_MANAGED_POLICY.to_string()],
            statements: Vec::new(),
            source,
            platform: Platform::WebCompute,
            auto_branch_deletion: true,
            build_spec,
            environment_variables: BTreeMap::new(),
            branch,
            output: OutputConfig::default(),
        }
    }
}

/// Principals of the application role: the hosting service, unsuffixed and
/// region-qualified. Some regions address the service by one form and some
/// by the other, so both are always present.
pub fn hosting_principals(region: Expr) -> CompositePrincipal {
    CompositePrincipal::new([
        ServicePrincipal::global(HOSTING_SERVICE),
        ServicePrincipal::regional(HOSTING_SERVICE, region),
    ])
}

/// Principals of the compute role: the hosting principals plus the build
/// service, which assumes the role on its own during builds.
pub fn compute_principals(region: Expr) -> CompositePrincipal {
    CompositePrincipal::new([
        ServicePrincipal::global(HOSTING_SERVICE),
        ServicePrincipal::global(BUILD_SERVICE),
        ServicePrincipal::regional(HOSTING_SERVICE, region),
    ])
}

fn compose_role(
    config: &RoleConfig,
    principals: CompositePrincipal,
    policies: &[ManagedPolicy],
    statements: &[PolicyStatement],
) -> Role {
    let mut role = Role::new(config.id.clone(), principals);
    if let Some(description) = &config.description {
        role = role.with_description(description.clone());
    }
    for policy in policies {
        role.add_managed_policy(policy.clone());
    }
    for statement in statements {
        role.add_to_policy(statement.clone());
    }
    role
}

fn add_role(stack: &mut Stack, role: &Role) -> Result<LogicalId> {
    let path = ConstructPath::root(&role.id)?.child("Resource")?;
    stack.add_resource(path, Resource::Role(role.to_properties()))
}

/// Assemble the hosting stack and register it in `app` under `id`.
///
/// Fails without touching `app` if the stack id is taken or any part of the
/// configuration is invalid.
pub fn build<'a>(
    app: &'a mut App,
    id: &str,
    options: StackOptions,
    config: &HostingConfig,
) -> Result<&'a Stack> {
    if app.stack(id).is_some() {
        return Err(Error::Duplicate(format!("stack '{}' already exists", id)));
    }

    let mut stack = Stack::new(id, options)?;
    let region = stack.region();

    let policies = config
        .managed_policies
        .iter()
        .map(ManagedPolicy::aws_managed)
        .collect::<Result<Vec<_>>>()?;

    let role = compose_role(
        &config.role,
        hosting_principals(region.clone()),
        &policies,
        &config.statements,
    );
    let role_id = add_role(&mut stack, &role)?;

    let compute_role_id = match &config.compute_role {
        Some(compute) => {
            let compute_role = compose_role(
                compute,
                compute_principals(region),
                &policies,
                &config.statements,
            );
            Some(add_role(&mut stack, &compute_role)?)
        }
        None => None,
    };

    let hosted = HostedApp {
        id: config.app_id.clone(),
        description: config.app_description.clone(),
        source: config.source.clone(),
        platform: config.platform,
        auto_branch_deletion: config.auto_branch_deletion,
        build_spec: config.build_spec.clone(),
        environment_variables: config.environment_variables.clone(),
    };
    let properties = hosted.to_properties(
        Expr::get_att(&role_id, "Arn"),
        compute_role_id.as_ref().map(|id| Expr::get_att(id, "Arn")),
    )?;

    let app_path = ConstructPath::root(&config.app_id)?;
    let app_logical_id =
        stack.add_resource(app_path.child("Resource")?, Resource::App(Box::new(properties)))?;
    let app_id = Expr::get_att(&app_logical_id, APP_ID_ATTRIBUTE);

    let branch_path = app_path
        .child(&config.branch.subdomain())?
        .child("Resource")?;
    stack.add_resource(
        branch_path,
        Resource::Branch(config.branch.to_properties(app_id.clone())),
    )?;

    stack.add_output(
        &config.output.id,
        config.branch.url(app_id),
        config.output.description.clone(),
    )?;

    stack.validate()?;

    info!(
        stack = %stack.id(),
        app = %config.app_id,
        branch = %config.branch.name,
        platform = %config.platform,
        resources = stack.resources().count(),
        "Assembled hosting stack"
    );

    let stack = app.add(stack)?;
    Ok(&*stack)
}
