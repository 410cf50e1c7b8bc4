//! Deferred values.
//!
//! Some values in a stack are only known once the reconciler has created the
//! resources (an application id, the deployment region of an environment
//! agnostic stack). Those values are modelled as [`Expr`] trees that render to
//! template intrinsics and can later be resolved against the reconciler's
//! view of the world through a [`Resolver`].

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::{Error, Result};

/// Pseudo parameters supplied by the reconciler for every stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pseudo {
    Region,
    AccountId,
    Partition,
    UrlSuffix,
    StackName,
}

impl Pseudo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pseudo::Region => "AWS::Region",
            Pseudo::AccountId => "AWS::AccountId",
            Pseudo::Partition => "AWS::Partition",
            Pseudo::UrlSuffix => "AWS::URLSuffix",
            Pseudo::StackName => "AWS::StackName",
        }
    }
}

impl std::fmt::Display for Pseudo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A string-valued expression, possibly referencing values assigned at apply
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// A value fully known at synthesis.
    Literal(String),
    /// Reference to a resource's primary identifier or a pseudo parameter.
    Ref(String),
    /// An attribute of a resource.
    GetAtt { logical_id: String, attribute: String },
    /// Concatenation of parts.
    Join(Vec<Expr>),
}

impl Expr {
    pub fn literal(value: impl Into<String>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn pseudo(param: Pseudo) -> Self {
        Expr::Ref(param.as_str().to_string())
    }

    pub fn reference(logical_id: impl AsRef<str>) -> Self {
        Expr::Ref(logical_id.as_ref().to_string())
    }

    pub fn get_att(logical_id: impl AsRef<str>, attribute: impl Into<String>) -> Self {
        Expr::GetAtt {
            logical_id: logical_id.as_ref().to_string(),
            attribute: attribute.into(),
        }
    }

    /// Concatenate parts, flattening nested joins and merging adjacent
    /// literals. A single remaining part is returned as is.
    pub fn concat(parts: impl IntoIterator<Item = Expr>) -> Self {
        let mut merged: Vec<Expr> = Vec::new();

        let mut stack: Vec<Expr> = parts.into_iter().collect();
        stack.reverse();
        while let Some(part) = stack.pop() {
            match part {
                Expr::Join(inner) => stack.extend(inner.into_iter().rev()),
                Expr::Literal(s) if s.is_empty() => {}
                Expr::Literal(s) => match merged.last_mut() {
                    Some(Expr::Literal(prev)) => prev.push_str(&s),
                    _ => merged.push(Expr::Literal(s)),
                },
                other => merged.push(other),
            }
        }

        match merged.len() {
            0 => Expr::Literal(String::new()),
            1 => merged.remove(0),
            _ => Expr::Join(merged),
        }
    }

    /// The literal value, if this expression needs no resolution.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Expr::Literal(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        !matches!(self, Expr::Literal(_))
    }

    /// Logical ids this expression refers to, in order of appearance.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ref(name) if name.starts_with("AWS::") => {}
            Expr::Ref(name) => out.push(name),
            Expr::GetAtt { logical_id, .. } => out.push(logical_id),
            Expr::Join(parts) => parts.iter().for_each(|p| p.collect_references(out)),
        }
    }

    /// Resolve to a concrete string using values assigned by the reconciler.
    pub fn resolve(&self, resolver: &dyn Resolver) -> Result<String> {
        match self {
            Expr::Literal(s) => Ok(s.clone()),
            Expr::Ref(name) => {
                let value = if name.starts_with("AWS::") {
                    resolver.pseudo(name)
                } else {
                    resolver.reference(name)
                };
                value
                    .map(str::to_string)
                    .ok_or_else(|| Error::Unresolved(format!("${{{}}}", name)))
            }
            Expr::GetAtt {
                logical_id,
                attribute,
            } => resolver
                .attribute(logical_id, attribute)
                .map(str::to_string)
                .ok_or_else(|| Error::Unresolved(format!("${{{}.{}}}", logical_id, attribute))),
            Expr::Join(parts) => parts.iter().map(|p| p.resolve(resolver)).collect(),
        }
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Literal(value.to_string())
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::Literal(value)
    }
}

impl From<Pseudo> for Expr {
    fn from(param: Pseudo) -> Self {
        Expr::pseudo(param)
    }
}

/// Symbolic form, e.g. `https://main.${NextApp.AppId}.amplifyapp.com`.
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(s) => write!(f, "{}", s),
            Expr::Ref(name) => write!(f, "${{{}}}", name),
            Expr::GetAtt {
                logical_id,
                attribute,
            } => write!(f, "${{{}.{}}}", logical_id, attribute),
            Expr::Join(parts) => parts.iter().try_for_each(|p| write!(f, "{}", p)),
        }
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Expr::Literal(s) => serializer.serialize_str(s),
            Expr::Ref(name) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Ref", name)?;
                map.end()
            }
            Expr::GetAtt {
                logical_id,
                attribute,
            } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::GetAtt", &[logical_id, attribute])?;
                map.end()
            }
            Expr::Join(parts) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::Join", &JoinArgs(parts))?;
                map.end()
            }
        }
    }
}

struct JoinArgs<'a>(&'a [Expr]);

impl Serialize for JoinArgs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element("")?;
        seq.serialize_element(self.0)?;
        seq.end()
    }
}

/// Source of values assigned by the reconciler.
pub trait Resolver {
    /// Resolve a pseudo parameter such as `AWS::Region`.
    fn pseudo(&self, name: &str) -> Option<&str>;

    /// Resolve the primary identifier of a resource.
    fn reference(&self, logical_id: &str) -> Option<&str>;

    /// Resolve an attribute of a resource.
    fn attribute(&self, logical_id: &str, attribute: &str) -> Option<&str>;
}

/// A [`Resolver`] backed by fixed maps, e.g. values read back from a deployed
/// stack or stubbed in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    pseudo: BTreeMap<String, String>,
    references: BTreeMap<String, String>,
    attributes: BTreeMap<(String, String), String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pseudo(mut self, param: Pseudo, value: impl Into<String>) -> Self {
        self.pseudo.insert(param.as_str().to_string(), value.into());
        self
    }

    pub fn with_reference(mut self, logical_id: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.references
            .insert(logical_id.as_ref().to_string(), value.into());
        self
    }

    pub fn with_attribute(
        mut self,
        logical_id: impl AsRef<str>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.insert(
            (logical_id.as_ref().to_string(), attribute.into()),
            value.into(),
        );
        self
    }
}

impl Resolver for StaticResolver {
    fn pseudo(&self, name: &str) -> Option<&str> {
        self.pseudo.get(name).map(String::as_str)
    }

    fn reference(&self, logical_id: &str) -> Option<&str> {
        self.references.get(logical_id).map(String::as_str)
    }

    fn attribute(&self, logical_id: &str, attribute: &str) -> Option<&str> {
        self.attributes
            .get(&(logical_id.to_string(), attribute.to_string()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_concat_merges_literals() {
        let expr = Expr::concat([
            Expr::literal("amplify."),
            Expr::literal("us-east-1"),
            Expr::literal(".amazonaws.com"),
        ]);
        assert_eq!(expr, Expr::literal("amplify.us-east-1.amazonaws.com"));
        assert!(!expr.is_deferred());
    }

    #[test]
    fn test_concat_flattens_nested_joins() {
        let inner = Expr::concat([Expr::literal("a"), Expr::pseudo(Pseudo::Region)]);
        let expr = Expr::concat([inner, Expr::literal("b"), Expr::literal("c")]);
        assert_eq!(
            expr,
            Expr::Join(vec![
                Expr::literal("a"),
                Expr::pseudo(Pseudo::Region),
                Expr::literal("bc"),
            ])
        );
    }

    #[test]
    fn test_concat_of_single_reference_is_not_joined() {
        let expr = Expr::concat([
            Expr::literal(""),
            Expr::get_att("NextApp", "AppId"),
        ]);
        assert_eq!(expr, Expr::get_att("NextApp", "AppId"));
        assert_eq!(
            serde_json::to_value(&expr).unwrap(),
            json!({ "Fn::GetAtt": ["NextApp", "AppId"] })
        );
    }

    #[test]
    fn test_serialize_intrinsics() {
        let expr = Expr::concat([
            Expr::literal("https://main."),
            Expr::get_att("NextApp1234", "AppId"),
            Expr::literal(".amplifyapp.com"),
        ]);
        let value = serde_json::to_value(&expr).unwrap();
        assert_eq!(
            value,
            json!({
                "Fn::Join": ["", [
                    "https://main.",
                    { "Fn::GetAtt": ["NextApp1234", "AppId"] },
                    ".amplifyapp.com"
                ]]
            })
        );

        let region = serde_json::to_value(Expr::pseudo(Pseudo::Region)).unwrap();
        assert_eq!(region, json!({ "Ref": "AWS::Region" }));
    }

    #[test]
    fn test_display_is_symbolic() {
        let expr = Expr::concat([
            Expr::literal("https://main."),
            Expr::get_att("NextApp", "AppId"),
            Expr::literal(".amplifyapp.com"),
        ]);
        assert_eq!(expr.to_string(), "https://main.${NextApp.AppId}.amplifyapp.com");
    }

    #[test]
    fn test_resolve_with_static_resolver() {
        let resolver = StaticResolver::new()
            .with_attribute("NextApp", "AppId", "abc123")
            .with_pseudo(Pseudo::Region, "eu-west-1");

        let expr = Expr::concat([
            Expr::get_att("NextApp", "AppId"),
            Expr::literal("@"),
            Expr::pseudo(Pseudo::Region),
        ]);
        assert_eq!(expr.resolve(&resolver).unwrap(), "abc123@eu-west-1");
    }

    #[test]
    fn test_resolve_missing_value_fails() {
        let expr = Expr::get_att("NextApp", "AppId");
        let err = expr.resolve(&StaticResolver::new()).unwrap_err();
        assert!(matches!(err, Error::Unresolved(ref s) if s == "${NextApp.AppId}"));
    }

    #[test]
    fn test_references_skip_pseudo_parameters() {
        let expr = Expr::concat([
            Expr::reference("RoleA"),
            Expr::pseudo(Pseudo::Partition),
            Expr::get_att("AppB", "Arn"),
        ]);
        assert_eq!(expr.references(), vec!["RoleA", "AppB"]);
    }
}
