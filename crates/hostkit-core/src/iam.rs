//! IAM principals, policies and roles.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::token::{Expr, Pseudo};
use crate::{Error, Result};

/// Policy language version emitted on every policy document.
pub const POLICY_VERSION: &str = "2012-10-17";

const ASSUME_ROLE_ACTION: &str = "sts:AssumeRole";

/// A service identity allowed to assume a role, e.g. `amplify.amazonaws.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServicePrincipal(Expr);

impl ServicePrincipal {
    pub fn new(identity: impl Into<Expr>) -> Self {
        Self(identity.into())
    }

    /// The unsuffixed identity of a service: `<service>.amazonaws.com`.
    pub fn global(service: &str) -> Self {
        Self(Expr::literal(format!("{}.amazonaws.com", service)))
    }

    /// The region-qualified identity of a service:
    /// `<service>.<region>.amazonaws.com`.
    pub fn regional(service: &str, region: Expr) -> Self {
        Self(Expr::concat([
            Expr::literal(format!("{}.", service)),
            region,
            Expr::literal(".amazonaws.com"),
        ]))
    }

    pub fn identity(&self) -> &Expr {
        &self.0
    }
}

/// An ordered, deduplicated set of service principals. Any one member may
/// assume the role the set is attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositePrincipal {
    principals: Vec<ServicePrincipal>,
}

impl CompositePrincipal {
    pub fn new(principals: impl IntoIterator<Item = ServicePrincipal>) -> Self {
        let mut set = Self::default();
        for principal in principals {
            set.add(principal);
        }
        set
    }

    /// Add a principal. Returns false if it was already present.
    pub fn add(&mut self, principal: ServicePrincipal) -> bool {
        if self.principals.contains(&principal) {
            return false;
        }
        self.principals.push(principal);
        true
    }

    pub fn contains(&self, principal: &ServicePrincipal) -> bool {
        self.principals.contains(principal)
    }

    /// True if every principal in `self` is also in `other`.
    pub fn is_subset_of(&self, other: &CompositePrincipal) -> bool {
        self.principals.iter().all(|p| other.contains(p))
    }

    pub fn principals(&self) -> &[ServicePrincipal] {
        &self.principals
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    /// The trust policy granting `sts:AssumeRole` to every member.
    pub fn assume_role_policy(&self) -> PolicyDocument {
        PolicyDocument::new(vec![PolicyStatement {
            effect: Effect::Allow,
            actions: vec![ASSUME_ROLE_ACTION.to_string()],
            resources: Vec::new(),
            services: self
                .principals
                .iter()
                .map(|p| p.identity().clone())
                .collect(),
        }])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Allow => write!(f, "Allow"),
            Effect::Deny => write!(f, "Deny"),
        }
    }
}

impl std::str::FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            _ => Err(format!("Unknown policy effect: {}", s)),
        }
    }
}

/// One statement of a policy document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<Expr>,
    /// Service principals, only set on trust policies.
    pub services: Vec<Expr>,
}

impl PolicyStatement {
    pub fn builder() -> PolicyStatementBuilder {
        PolicyStatementBuilder::new()
    }
}

/// Serializes a list as a scalar when it holds a single element.
struct OneOrMany<'a, T>(&'a [T]);

impl<T: Serialize> Serialize for OneOrMany<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            [single] => single.serialize(serializer),
            many => many.serialize(serializer),
        }
    }
}

struct ServiceList<'a>(&'a [Expr]);

impl Serialize for ServiceList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("Service", &OneOrMany(self.0))?;
        map.end()
    }
}

impl Serialize for PolicyStatement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("Action", &OneOrMany(&self.actions))?;
        map.serialize_entry("Effect", &self.effect)?;
        if !self.services.is_empty() {
            map.serialize_entry("Principal", &ServiceList(&self.services))?;
        }
        if !self.resources.is_empty() {
            map.serialize_entry("Resource", &OneOrMany(&self.resources))?;
        }
        map.end()
    }
}

/// Builder for permission statements attached to a role.
#[derive(Debug, Clone)]
pub struct PolicyStatementBuilder {
    effect: Effect,
    actions: Vec<String>,
    resources: Vec<Expr>,
}

impl PolicyStatementBuilder {
    pub fn new() -> Self {
        Self {
            effect: Effect::Allow,
            actions: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn effect(mut self, effect: Effect) -> Self {
        self.effect = effect;
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn resource(mut self, resource: impl Into<Expr>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn build(self) -> Result<PolicyStatement> {
        if self.actions.is_empty() {
            return Err(Error::InvalidInput(
                "policy statement needs at least one action".to_string(),
            ));
        }
        if let Some(blank) = self.actions.iter().find(|a| a.trim().is_empty()) {
            return Err(Error::InvalidInput(format!(
                "policy statement has a blank action: '{}'",
                blank
            )));
        }
        if self.resources.is_empty() {
            return Err(Error::InvalidInput(
                "policy statement needs at least one resource".to_string(),
            ));
        }
        Ok(PolicyStatement {
            effect: self.effect,
            actions: self.actions,
            resources: self.resources,
            services: Vec::new(),
        })
    }
}

impl Default for PolicyStatementBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDocument {
    #[serde(rename = "Statement")]
    pub statements: Vec<PolicyStatement>,
    #[serde(rename = "Version")]
    pub version: &'static str,
}

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self {
            statements,
            version: POLICY_VERSION,
        }
    }
}

/// A policy maintained by the provider, attached by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedPolicy {
    name: String,
}

impl ManagedPolicy {
    pub fn aws_managed(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "managed policy name must not be empty".to_string(),
            ));
        }
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arn(&self) -> Expr {
        Expr::concat([
            Expr::literal("arn:"),
            Expr::pseudo(Pseudo::Partition),
            Expr::literal(format!(":iam::aws:policy/{}", self.name)),
        ])
    }
}

/// An identity role before it is placed in a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub description: Option<String>,
    pub assumed_by: CompositePrincipal,
    managed_policies: Vec<ManagedPolicy>,
    statements: Vec<PolicyStatement>,
}

impl Role {
    pub fn new(id: impl Into<String>, assumed_by: CompositePrincipal) -> Self {
        Self {
            id: id.into(),
            description: None,
            assumed_by,
            managed_policies: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a managed policy; attaching the same policy twice is a no-op.
    pub fn add_managed_policy(&mut self, policy: ManagedPolicy) {
        if !self.managed_policies.contains(&policy) {
            self.managed_policies.push(policy);
        }
    }

    pub fn add_to_policy(&mut self, statement: PolicyStatement) {
        self.statements.push(statement);
    }

    pub fn managed_policies(&self) -> &[ManagedPolicy] {
        &self.managed_policies
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    pub fn to_properties(&self) -> RoleProperties {
        let policies = if self.statements.is_empty() {
            Vec::new()
        } else {
            vec![InlinePolicy {
                policy_name: format!("{}DefaultPolicy", self.id),
                policy_document: PolicyDocument::new(self.statements.clone()),
            }]
        };

        RoleProperties {
            assume_role_policy_document: self.assumed_by.assume_role_policy(),
            description: self.description.clone(),
            managed_policy_arns: self.managed_policies.iter().map(ManagedPolicy::arn).collect(),
            policies,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleProperties {
    pub assume_role_policy_document: PolicyDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub managed_policy_arns: Vec<Expr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<InlinePolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InlinePolicy {
    pub policy_name: String,
    pub policy_document: PolicyDocument,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_composite_principal_dedups_in_order() {
        let set = CompositePrincipal::new([
            ServicePrincipal::global("amplify"),
            ServicePrincipal::global("codebuild"),
            ServicePrincipal::global("amplify"),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.principals()[0].identity().as_literal(),
            Some("amplify.amazonaws.com")
        );
        assert_eq!(
            set.principals()[1].identity().as_literal(),
            Some("codebuild.amazonaws.com")
        );
    }

    #[test]
    fn test_regional_principal_with_literal_region() {
        let p = ServicePrincipal::regional("amplify", Expr::literal("ap-southeast-2"));
        assert_eq!(
            p.identity().as_literal(),
            Some("amplify.ap-southeast-2.amazonaws.com")
        );
    }

    #[test]
    fn test_trust_policy_document() {
        let set = CompositePrincipal::new([
            ServicePrincipal::global("amplify"),
            ServicePrincipal::regional("amplify", Expr::pseudo(Pseudo::Region)),
        ]);
        let value = serde_json::to_value(set.assume_role_policy()).unwrap();
        assert_eq!(
            value,
            json!({
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": {
                        "Service": [
                            "amplify.amazonaws.com",
                            { "Fn::Join": ["", ["amplify.", { "Ref": "AWS::Region" }, ".amazonaws.com"]] }
                        ]
                    }
                }],
                "Version": "2012-10-17"
            })
        );
    }

    #[test]
    fn test_managed_policy_arn() {
        let policy = ManagedPolicy::aws_managed("AdministratorAccess").unwrap();
        let value = serde_json::to_value(policy.arn()).unwrap();
        assert_eq!(
            value,
            json!({
                "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, ":iam::aws:policy/AdministratorAccess"]]
            })
        );
    }

    #[test]
    fn test_statement_builder_validates() {
        assert!(PolicyStatement::builder().resource("*").build().is_err());
        assert!(PolicyStatement::builder().action("s3:GetObject").build().is_err());
        assert!(
            PolicyStatement::builder()
                .action(" ")
                .resource("*")
                .build()
                .is_err()
        );

        let statement = PolicyStatement::builder()
            .action("s3:GetObject")
            .action("s3:PutObject")
            .resource("arn:aws:s3:::assets/*")
            .build()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&statement).unwrap(),
            json!({
                "Action": ["s3:GetObject", "s3:PutObject"],
                "Effect": "Allow",
                "Resource": "arn:aws:s3:::assets/*"
            })
        );
    }

    #[test]
    fn test_role_properties_with_inline_policy() {
        let mut role = Role::new(
            "AmplifyRole",
            CompositePrincipal::new([ServicePrincipal::global("amplify")]),
        )
        .with_description("Custom role");
        role.add_managed_policy(ManagedPolicy::aws_managed("ReadOnlyAccess").unwrap());
        role.add_managed_policy(ManagedPolicy::aws_managed("ReadOnlyAccess").unwrap());
        role.add_to_policy(
            PolicyStatement::builder()
                .effect(Effect::Deny)
                .action("iam:*")
                .resource("*")
                .build()
                .unwrap(),
        );

        let value = serde_json::to_value(role.to_properties()).unwrap();
        assert_eq!(value["Description"], "Custom role");
        assert_eq!(value["ManagedPolicyArns"].as_array().unwrap().len(), 1);
        assert_eq!(value["Policies"][0]["PolicyName"], "AmplifyRoleDefaultPolicy");
        assert_eq!(
            value["Policies"][0]["PolicyDocument"]["Statement"][0]["Effect"],
            "Deny"
        );
    }

    #[test]
    fn test_effect_from_str() {
        assert_eq!("ALLOW".parse::<Effect>().unwrap(), Effect::Allow);
        assert_eq!("deny".parse::<Effect>().unwrap(), Effect::Deny);
        assert!("maybe".parse::<Effect>().is_err());
    }
}
