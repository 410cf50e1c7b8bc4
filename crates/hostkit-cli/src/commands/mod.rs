//! CLI command implementations.

pub mod init;
pub mod synth;

use anyhow::{Context, Result};
use hostkit_config::{StackDefinition, VariableContext, VariableContextBuilder, parse_assignment};
use hostkit_core::App;
use std::path::Path;

/// Build the interpolation context from command line flags.
pub fn variables(
    region: Option<&str>,
    account: Option<&str>,
    assignments: &[String],
) -> Result<VariableContext> {
    let mut builder = VariableContextBuilder::new();
    if let Some(region) = region {
        builder = builder.with_region(region);
    }
    if let Some(account) = account {
        builder = builder.with_account(account);
    }
    for assignment in assignments {
        let (key, value) = parse_assignment(assignment)?;
        builder = builder.with_custom(key, value);
    }
    Ok(builder.build())
}

/// Read and parse a configuration file.
pub fn load(path: &Path, vars: &VariableContext) -> Result<StackDefinition> {
    hostkit_config::load_stack_config(path, vars)
        .with_context(|| format!("Failed to load stack config: {}", path.display()))
}

/// Parse and assemble a configuration without writing anything.
pub fn check(path: &Path, vars: &VariableContext) -> Result<StackDefinition> {
    let definition = load(path, vars)?;
    let mut app = App::new();
    definition
        .assemble(&mut app)
        .with_context(|| format!("Failed to assemble stack '{}'", definition.id))?;
    Ok(definition)
}

pub fn validate(path: &Path, vars: &VariableContext) -> Result<()> {
    match check(path, vars) {
        Ok(definition) => {
            println!(
                "Configuration is valid: stack '{}', app '{}', branch '{}'",
                definition.id, definition.hosting.app_id, definition.hosting.branch.name
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

pub fn buildspec(path: &Path, vars: &VariableContext) -> Result<()> {
    let definition = load(path, vars)?;
    let yaml = definition
        .hosting
        .build_spec
        .to_yaml()
        .context("Failed to encode build specification")?;
    print!("{}", yaml);
    Ok(())
}
