//! References to secrets held by an external secret store.
//!
//! A [`SecretRef`] names where a secret lives; the value itself never enters
//! the stack. The reconciler substitutes it when it applies the template.

use serde::{Deserialize, Serialize};

use crate::token::Expr;
use crate::{Error, Result};

/// Location of a secret: a store path plus an optional JSON field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub path: String,
    pub json_field: Option<String>,
}

impl SecretRef {
    pub fn secrets_manager(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(Error::MissingField("secret path".to_string()));
        }
        Ok(Self {
            path,
            json_field: None,
        })
    }

    pub fn with_json_field(mut self, field: impl Into<String>) -> Self {
        self.json_field = Some(field.into()).filter(|f: &String| !f.is_empty());
        self
    }

    /// The dynamic reference string the reconciler resolves at apply time,
    /// e.g. `{{resolve:secretsmanager:dev/app/token:SecretString:token::}}`.
    pub fn dynamic_reference(&self) -> String {
        format!(
            "{{{{resolve:secretsmanager:{}:SecretString:{}::}}}}",
            self.path,
            self.json_field.as_deref().unwrap_or_default()
        )
    }

    pub fn to_expr(&self) -> Expr {
        Expr::literal(self.dynamic_reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_reference_with_field() {
        let secret = SecretRef::secrets_manager("dev/testapp/github-token")
            .unwrap()
            .with_json_field("token");
        assert_eq!(
            secret.dynamic_reference(),
            "{{resolve:secretsmanager:dev/testapp/github-token:SecretString:token::}}"
        );
    }

    #[test]
    fn test_dynamic_reference_without_field() {
        let secret = SecretRef::secrets_manager("prod/token").unwrap();
        assert_eq!(
            secret.dynamic_reference(),
            "{{resolve:secretsmanager:prod/token:SecretString:::}}"
        );
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(matches!(
            SecretRef::secrets_manager("  "),
            Err(Error::MissingField(_))
        ));
    }
}
