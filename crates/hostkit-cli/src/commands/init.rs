//! Starter configuration command.

use anyhow::{Context, Result, bail};
use std::path::Path;

/// Configuration written by `hostkit init`: a server-rendered Next.js app
/// built with yarn from a GitHub repository.
pub const SAMPLE_CONFIG: &str = r#"// hostkit stack configuration

stack "InfraStack" {
    // region "us-east-1"
    // account "123456789012"
    format "json"
}

app "NextApp" {
    platform "WEB_COMPUTE"
    auto-branch-deletion #true

    repository provider="github" owner="jtcarlos-cit" name="flow-hackathon-web"
    oauth-token secret="dev/testapp/github-token" field="token"

    role "AmplifyRole" description="Custom role permitting resources creation from Amplify"
    compute-role "ComputeAmplifyRole"
    managed-policy "AdministratorAccess"

    build-spec version=1 {
        pre-build "ls" "yarn cache clean" "yarn install"
        build "yarn build"
        artifacts base-directory=".next" {
            files "**/*"
        }
        cache "node_modules/**/*"
    }

    branch "main" stage="PRODUCTION"
}

output "AmplifyAppUrl" description="Amplify App URL"
"#;

/// Write the starter configuration to `path`.
pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    std::fs::write(path, SAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostkit_config::{VariableContext, parse_stack_config};

    #[test]
    fn test_sample_config_parses() {
        let definition = parse_stack_config(SAMPLE_CONFIG, &VariableContext::new()).unwrap();
        assert_eq!(definition.hosting.app_id, "NextApp");
        assert_eq!(definition.hosting.branch.name, "main");
        assert_eq!(
            definition.hosting.build_spec.pre_build_commands(),
            ["ls", "yarn cache clean", "yarn install"]
        );
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostkit.kdl");
        std::fs::write(&path, "keep me").unwrap();

        assert!(init(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");

        init(&path, true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE_CONFIG);
    }
}
