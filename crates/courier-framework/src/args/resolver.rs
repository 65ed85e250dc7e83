use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::args::ArgValue;
use crate::descriptor::TypeTag;

/// Converts one token into a typed value.
///
/// Returning `Err(reason)` makes binding fail with an invalid-argument error
/// naming the parameter; the reason is shown to the actor.
pub trait ArgResolver: Send + Sync + 'static {
    fn resolve(&self, token: &str) -> Result<ArgValue, String>;
}

impl<F> ArgResolver for F
where
    F: Fn(&str) -> Result<ArgValue, String> + Send + Sync + 'static,
{
    fn resolve(&self, token: &str) -> Result<ArgValue, String> {
        self(token)
    }
}

/// Type-to-resolver table used by the binder.
///
/// Primitives, choices and mentions are built in. Custom types are looked up
/// by the name given in [`TypeTag::Custom`].
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    custom: HashMap<String, Arc<dyn ArgResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the resolver for a custom type name.
    pub fn register(&mut self, type_name: impl Into<String>, resolver: impl ArgResolver) {
        self.custom.insert(type_name.into(), Arc::new(resolver));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.custom.contains_key(type_name)
    }

    /// Resolves `token` as `tag`.
    pub fn resolve(&self, tag: &TypeTag, token: &str) -> Result<ArgValue, String> {
        match tag {
            TypeTag::String => Ok(ArgValue::Text(token.to_string())),
            TypeTag::Int => token
                .parse::<i64>()
                .map(ArgValue::Int)
                .map_err(|_| "expected a whole number".to_string()),
            TypeTag::Float => token
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(ArgValue::Float)
                .ok_or_else(|| "expected a number".to_string()),
            TypeTag::Bool => parse_bool(token)
                .map(ArgValue::Bool)
                .ok_or_else(|| "expected yes or no".to_string()),
            TypeTag::Choice(choices) => choices
                .iter()
                .find(|c| c.eq_ignore_ascii_case(token))
                .map(|c| ArgValue::Text(c.clone()))
                .ok_or_else(|| format!("expected one of: {}", choices.join(", "))),
            TypeTag::Mention => match token.strip_prefix('@') {
                Some(name) if !name.is_empty() => Ok(ArgValue::Text(name.to_string())),
                _ => Err("expected a @mention".to_string()),
            },
            TypeTag::Custom(name) => match self.custom.get(name) {
                Some(resolver) => resolver.resolve(token),
                None => Err(format!("no resolver for type `{name}`")),
            },
        }
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn parse_bool(token: &str) -> Option<bool> {
    match token.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_primitives() {
        let resolvers = ResolverRegistry::new();
        assert_eq!(
            resolvers.resolve(&TypeTag::Int, "100").unwrap(),
            ArgValue::Int(100)
        );
        assert!(resolvers.resolve(&TypeTag::Int, "1.5").is_err());
        assert_eq!(
            resolvers.resolve(&TypeTag::Float, "1.5").unwrap(),
            ArgValue::Float(1.5)
        );
        assert!(resolvers.resolve(&TypeTag::Float, "NaN").is_err());
        assert_eq!(
            resolvers.resolve(&TypeTag::Bool, "Yes").unwrap(),
            ArgValue::Bool(true)
        );
    }

    #[test]
    fn test_choice_is_case_insensitive_and_canonical() {
        let resolvers = ResolverRegistry::new();
        let tag = TypeTag::Choice(vec!["Low".into(), "High".into()]);
        assert_eq!(
            resolvers.resolve(&tag, "HIGH").unwrap(),
            ArgValue::Text("High".into())
        );
        assert_eq!(
            resolvers.resolve(&tag, "mid").unwrap_err(),
            "expected one of: Low, High"
        );
    }

    #[test]
    fn test_mention() {
        let resolvers = ResolverRegistry::new();
        assert_eq!(
            resolvers.resolve(&TypeTag::Mention, "@alice").unwrap(),
            ArgValue::Text("alice".into())
        );
        assert!(resolvers.resolve(&TypeTag::Mention, "@").is_err());
        assert!(resolvers.resolve(&TypeTag::Mention, "alice").is_err());
    }

    #[test]
    fn test_custom_resolver() {
        #[derive(Debug, PartialEq)]
        struct Hex(u32);

        let mut resolvers = ResolverRegistry::new();
        resolvers.register("hex", |token: &str| {
            u32::from_str_radix(token.trim_start_matches("0x"), 16)
                .map(|n| ArgValue::custom(Hex(n)))
                .map_err(|e| e.to_string())
        });

        let tag = TypeTag::Custom("hex".into());
        let ArgValue::Custom(value) = resolvers.resolve(&tag, "0xff").unwrap() else {
            panic!("expected a custom value");
        };
        assert_eq!(value.downcast_ref::<Hex>(), Some(&Hex(255)));

        let unknown = TypeTag::Custom("color".into());
        assert!(resolvers.resolve(&unknown, "red").is_err());
    }
}
