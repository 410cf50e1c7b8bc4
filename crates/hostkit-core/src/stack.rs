//! Stacks and the scope tree they live in.
//!
//! An [`App`] is the root scope and owns any number of uniquely named
//! [`Stack`]s. A stack records resources and outputs under construct paths
//! and renders them as a template for the external reconciler.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::application::{AppProperties, BranchProperties};
use crate::iam::RoleProperties;
use crate::id::{ConstructPath, LogicalId};
use crate::token::{Expr, Pseudo, Resolver};
use crate::{Error, Result};

const MAX_STACK_NAME_LEN: usize = 128;

/// Serialization format of a synthesized template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TemplateFormat::Json => "json",
            TemplateFormat::Yaml => "yaml",
        }
    }
}

impl std::fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl std::str::FromStr for TemplateFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(TemplateFormat::Json),
            "yaml" | "yml" => Ok(TemplateFormat::Yaml),
            _ => Err(format!("Unknown template format: {}", s)),
        }
    }
}

/// Deployment environment and rendering options of a stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOptions {
    /// Target region. Left unset, the stack is region-agnostic and region
    /// dependent values are deferred to the reconciler.
    pub region: Option<String>,
    /// Target account. Left unset, the stack is account-agnostic.
    pub account: Option<String>,
    /// Template description.
    pub description: Option<String>,
    /// Output format of the rendered template.
    pub format: TemplateFormat,
}

/// A declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "Type", content = "Properties")]
pub enum Resource {
    #[serde(rename = "AWS::IAM::Role")]
    Role(RoleProperties),
    #[serde(rename = "AWS::Amplify::App")]
    App(Box<AppProperties>),
    #[serde(rename = "AWS::Amplify::Branch")]
    Branch(BranchProperties),
}

impl Resource {
    pub fn type_name(&self) -> &'static str {
        match self {
            Resource::Role(_) => "AWS::IAM::Role",
            Resource::App(_) => "AWS::Amplify::App",
            Resource::Branch(_) => "AWS::Amplify::Branch",
        }
    }
}

/// A named value surfaced to the operator once the stack is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: Expr,
}

/// The resource graph of one stack, as submitted to the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub resources: BTreeMap<LogicalId, Resource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<LogicalId, Output>,
}

#[derive(Debug, Clone)]
pub struct Stack {
    id: String,
    options: StackOptions,
    /// Every construct path in use, including intermediate nodes.
    nodes: BTreeSet<ConstructPath>,
    template: Template,
}

impl Stack {
    pub fn new(id: &str, options: StackOptions) -> Result<Self> {
        validate_stack_name(id)?;
        let template = Template {
            description: options.description.clone(),
            ..Template::default()
        };
        Ok(Self {
            id: id.to_string(),
            options,
            nodes: BTreeSet::new(),
            template,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &StackOptions {
        &self.options
    }

    /// The stack region: a literal when configured, otherwise deferred.
    pub fn region(&self) -> Expr {
        match &self.options.region {
            Some(region) => Expr::literal(region.clone()),
            None => Expr::pseudo(Pseudo::Region),
        }
    }

    /// The stack account: a literal when configured, otherwise deferred.
    pub fn account(&self) -> Expr {
        match &self.options.account {
            Some(account) => Expr::literal(account.clone()),
            None => Expr::pseudo(Pseudo::AccountId),
        }
    }

    /// Claim a construct path. Fails if the path is already a node.
    fn claim(&mut self, path: &ConstructPath) -> Result<()> {
        if self.nodes.contains(path) {
            return Err(Error::Duplicate(format!(
                "construct '{}' already exists in stack '{}'",
                path, self.id
            )));
        }

        let mut prefix: Option<ConstructPath> = None;
        for component in path.components() {
            let next = match &prefix {
                Some(p) => p.child(component)?,
                None => ConstructPath::root(component)?,
            };
            self.nodes.insert(next.clone());
            prefix = Some(next);
        }
        Ok(())
    }

    /// Add a resource at a construct path and return its logical id.
    pub fn add_resource(&mut self, path: ConstructPath, resource: Resource) -> Result<LogicalId> {
        let logical_id = path.logical_id()?;
        if self.template.resources.contains_key(&logical_id)
            || self.template.outputs.contains_key(&logical_id)
        {
            return Err(Error::Duplicate(format!(
                "logical id '{}' already exists in stack '{}'",
                logical_id, self.id
            )));
        }
        self.claim(&path)?;

        debug!(stack = %self.id, path = %path, logical_id = %logical_id, kind = resource.type_name(), "Added resource");
        self.template.resources.insert(logical_id.clone(), resource);
        Ok(logical_id)
    }

    /// Add a top-level output.
    pub fn add_output(
        &mut self,
        id: &str,
        value: Expr,
        description: Option<String>,
    ) -> Result<LogicalId> {
        let path = ConstructPath::root(id)?;
        let logical_id = path.logical_id()?;
        if self.template.resources.contains_key(&logical_id)
            || self.template.outputs.contains_key(&logical_id)
        {
            return Err(Error::Duplicate(format!(
                "logical id '{}' already exists in stack '{}'",
                logical_id, self.id
            )));
        }
        self.claim(&path)?;

        debug!(stack = %self.id, output = %logical_id, value = %value, "Added output");
        self.template
            .outputs
            .insert(logical_id.clone(), Output { description, value });
        Ok(logical_id)
    }

    pub fn resource(&self, logical_id: &LogicalId) -> Option<&Resource> {
        self.template.resources.get(logical_id)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&LogicalId, &Resource)> {
        self.template.resources.iter()
    }

    /// Look up an output by the id it was added under.
    pub fn output(&self, id: &str) -> Option<&Output> {
        let logical_id = ConstructPath::root(id).and_then(|p| p.logical_id()).ok()?;
        self.template.outputs.get(&logical_id)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&LogicalId, &Output)> {
        self.template.outputs.iter()
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Check that every reference in the graph points at a declared resource.
    pub fn validate(&self) -> Result<()> {
        let value = serde_json::to_value(&self.template)?;
        let mut references = Vec::new();
        collect_references(&value, &mut references);

        for reference in references {
            let known = self
                .template
                .resources
                .keys()
                .any(|id| id.as_str() == reference);
            if !known {
                return Err(Error::InvalidInput(format!(
                    "stack '{}' references undeclared resource '{}'",
                    self.id, reference
                )));
            }
        }
        Ok(())
    }

    /// Render the template in the format chosen in the stack options.
    pub fn render(&self) -> Result<String> {
        self.render_as(self.options.format)
    }

    pub fn render_as(&self, format: TemplateFormat) -> Result<String> {
        self.validate()?;
        match format {
            TemplateFormat::Json => {
                let mut json = serde_json::to_string_pretty(&self.template)?;
                json.push('\n');
                Ok(json)
            }
            TemplateFormat::Yaml => Ok(serde_yaml::to_string(&self.template)?),
        }
    }

    /// File name of the rendered template, e.g. `InfraStack.template.json`.
    pub fn template_file_name(&self) -> String {
        format!("{}.template.{}", self.id, self.options.format.extension())
    }

    /// Resolve every output against values assigned by the reconciler.
    pub fn resolve_outputs(&self, resolver: &dyn Resolver) -> Result<BTreeMap<String, String>> {
        self.template
            .outputs
            .iter()
            .map(|(id, output)| {
                output
                    .value
                    .resolve(resolver)
                    .map(|value| (id.to_string(), value))
            })
            .collect()
    }
}

fn collect_references(value: &serde_json::Value, out: &mut Vec<String>) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            if let Some(Value::String(name)) = map.get("Ref") {
                if !name.starts_with("AWS::") {
                    out.push(name.clone());
                }
            }
            if let Some(Value::Array(args)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(id)) = args.first() {
                    out.push(id.clone());
                }
            }
            map.values().for_each(|v| collect_references(v, out));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}

/// Stack names start with a letter and contain only letters, digits and
/// hyphens.
fn validate_stack_name(id: &str) -> Result<()> {
    let valid = id.len() <= MAX_STACK_NAME_LEN
        && id.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(Error::InvalidInput(format!("invalid stack name '{}'", id)));
    }
    Ok(())
}

/// Root scope holding uniquely named stacks.
#[derive(Debug, Default)]
pub struct App {
    stacks: Vec<Stack>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stack(&mut self, id: &str, options: StackOptions) -> Result<&mut Stack> {
        self.add(Stack::new(id, options)?)
    }

    /// Register an assembled stack. Stack ids are unique within the app.
    pub fn add(&mut self, stack: Stack) -> Result<&mut Stack> {
        if self.stack(&stack.id).is_some() {
            return Err(Error::Duplicate(format!("stack '{}' already exists", stack.id)));
        }
        self.stacks.push(stack);
        let index = self.stacks.len() - 1;
        Ok(&mut self.stacks[index])
    }

    pub fn stack(&self, id: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.id == id)
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }
}
