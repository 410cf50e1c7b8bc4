//! Template synthesis command.

use anyhow::{Context, Result};
use hostkit_config::VariableContext;
use hostkit_core::{App, TemplateFormat};
use std::path::PathBuf;
use tracing::info;

pub struct SynthOptions {
    pub config: PathBuf,
    pub out: PathBuf,
    pub format: Option<TemplateFormat>,
    pub vars: VariableContext,
}

/// Synthesize the configured stack and write its template into the output
/// directory. Returns the path of the written template.
pub fn synth(options: &SynthOptions) -> Result<PathBuf> {
    let mut definition = super::load(&options.config, &options.vars)?;
    if let Some(format) = options.format {
        definition.options.format = format;
    }

    let mut app = App::new();
    let stack = definition
        .assemble(&mut app)
        .with_context(|| format!("Failed to assemble stack '{}'", definition.id))?;
    let rendered = stack.render().context("Failed to render template")?;

    std::fs::create_dir_all(&options.out).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            options.out.display()
        )
    })?;
    let path = options.out.join(stack.template_file_name());
    std::fs::write(&path, rendered)
        .with_context(|| format!("Failed to write template: {}", path.display()))?;

    info!(
        stack = %stack.id(),
        path = %path.display(),
        resources = stack.resources().count(),
        "Wrote template"
    );
    for (id, output) in stack.outputs() {
        info!(output = %id, value = %output.value, "Stack output");
    }

    println!("{}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init::SAMPLE_CONFIG;

    fn write_config(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("hostkit.kdl");
        std::fs::write(&path, SAMPLE_CONFIG).unwrap();
        path
    }

    #[test]
    fn test_synth_writes_json_template() {
        let dir = tempfile::tempdir().unwrap();
        let options = SynthOptions {
            config: write_config(dir.path()),
            out: dir.path().join("cdk.out"),
            format: None,
            vars: VariableContext::new(),
        };

        let path = synth(&options).unwrap();
        assert!(path.ends_with("cdk.out/InfraStack.template.json"));

        let template: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let types: Vec<&str> = template["Resources"]
            .as_object()
            .unwrap()
            .values()
            .map(|r| r["Type"].as_str().unwrap())
            .collect();
        assert_eq!(types.iter().filter(|t| **t == "AWS::IAM::Role").count(), 2);
        assert_eq!(types.iter().filter(|t| **t == "AWS::Amplify::App").count(), 1);
        assert_eq!(types.iter().filter(|t| **t == "AWS::Amplify::Branch").count(), 1);
        assert!(template["Outputs"]["AmplifyAppUrl"].is_object());
    }

    #[test]
    fn test_synth_is_byte_identical_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path());
        let run = |out: &str| {
            let options = SynthOptions {
                config: config.clone(),
                out: dir.path().join(out),
                format: None,
                vars: VariableContext::new(),
            };
            std::fs::read(synth(&options).unwrap()).unwrap()
        };
        assert_eq!(run("first"), run("second"));
    }

    #[test]
    fn test_synth_format_override() {
        let dir = tempfile::tempdir().unwrap();
        let options = SynthOptions {
            config: write_config(dir.path()),
            out: dir.path().join("out"),
            format: Some(TemplateFormat::Yaml),
            vars: VariableContext::new(),
        };

        let path = synth(&options).unwrap();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("InfraStack.template.yaml")
        );
    }
}
