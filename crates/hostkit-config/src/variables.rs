//! Variable interpolation for stack configurations.
//!
//! Supports variables like:
//! - `${stack.name}` - Stack identifier
//! - `${stack.region}` - Target region (if pinned)
//! - `${stack.account}` - Target account (if pinned)
//! - `${name}` - Custom variable supplied by the caller (e.g. `--var env=dev`)
//!
//! Unknown variables are left untouched so build commands can still refer to
//! variables of the build executor's shell.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::{ConfigError, ConfigResult};

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    /// Stack-related variables
    pub stack: StackContext,
    /// Custom variables defined by the caller
    pub custom: BTreeMap<String, String>,
}

/// Stack context for variable interpolation. Region and account set here
/// take precedence over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StackContext {
    pub name: String,
    pub region: Option<String>,
    pub account: Option<String>,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

impl VariableContext {
    /// Create a new empty variable context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a custom variable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.custom.insert(name.to_string(), value.into());
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["stack", "name"] if !self.stack.name.is_empty() => Some(self.stack.name.clone()),
            ["stack", "region"] => self.stack.region.clone(),
            ["stack", "account"] => self.stack.account.clone(),

            [name] => self.custom.get(*name).cloned(),

            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    /// Variables are specified as `${var_name}` or `${namespace.var_name}`.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Interpolate variables in a list of strings.
    pub fn interpolate_vec(&self, inputs: &[String]) -> Vec<String> {
        inputs.iter().map(|s| self.interpolate(s)).collect()
    }

    /// Names of variables in a string that this context cannot resolve.
    pub fn unresolved(&self, input: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(input)
            .map(|caps| caps[1].to_string())
            .filter(|name| self.resolve(name).is_none())
            .collect()
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_stack(mut self, name: impl Into<String>) -> Self {
        self.ctx.stack.name = name.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.ctx.stack.region = Some(region.into());
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.ctx.stack.account = Some(account.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.custom.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a `key=value` assignment as given on the command line.
pub fn parse_assignment(input: &str) -> ConfigResult<(String, String)> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidValue {
            field: "variable".to_string(),
            message: format!("expected key=value, got '{}'", input),
        })?;

    let key = key.trim();
    let valid_key = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_key {
        return Err(ConfigError::InvalidValue {
            field: "variable".to_string(),
            message: format!("invalid variable name '{}'", key),
        });
    }

    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_interpolation() {
        let ctx = VariableContextBuilder::new()
            .with_stack("InfraStack")
            .with_region("eu-west-1")
            .build();

        let result = ctx.interpolate("${stack.name} in ${stack.region}");
        assert_eq!(result, "InfraStack in eu-west-1");
    }

    #[test]
    fn test_custom_variables() {
        let mut ctx = VariableContext::new();
        ctx.set("env", "dev");
        ctx.set("app", "testapp");

        let result = ctx.interpolate("${env}/${app}/github-token");
        assert_eq!(result, "dev/testapp/github-token");
    }

    #[test]
    fn test_unknown_variable_preserved() {
        let ctx = VariableContext::new();
        let result = ctx.interpolate("echo ${AWS_BRANCH} ${stack.region}");
        assert_eq!(result, "echo ${AWS_BRANCH} ${stack.region}");
        assert_eq!(ctx.unresolved(&result), vec!["AWS_BRANCH", "stack.region"]);
    }

    #[test]
    fn test_shell_variables_without_braces_untouched() {
        let ctx = VariableContextBuilder::new().with_custom("HOME", "/x").build();
        assert_eq!(ctx.interpolate("cd $HOME"), "cd $HOME");
    }

    #[test]
    fn test_interpolate_vec() {
        let ctx = VariableContextBuilder::new()
            .with_custom("pm", "pnpm")
            .build();

        let inputs = vec!["${pm} install".to_string(), "${pm} build".to_string()];
        let results = ctx.interpolate_vec(&inputs);
        assert_eq!(results, vec!["pnpm install", "pnpm build"]);
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("env=dev").unwrap(),
            ("env".to_string(), "dev".to_string())
        );
        assert_eq!(
            parse_assignment("path=a=b").unwrap(),
            ("path".to_string(), "a=b".to_string())
        );
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("1x=y").is_err());
        assert!(parse_assignment("=y").is_err());
    }
}
