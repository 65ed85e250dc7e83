use tracing::trace;

use crate::args::{ArgValue, BoundArgs, ResolverRegistry, tokenize};
use crate::descriptor::{HandlerDescriptor, ParamKind, ParamSpec, TypeTag};
use crate::error::ArgumentError;

/// Binds argument text to a descriptor's token-consuming parameters.
///
/// Injected parameters are skipped here; their extractors read the dispatch
/// context directly. The returned values are in declaration order.
pub fn bind(
    descriptor: &HandlerDescriptor,
    raw_text: &str,
    resolvers: &ResolverRegistry,
) -> Result<BoundArgs, ArgumentError> {
    let tokens = tokenize(raw_text);
    let bound = bind_tokens(descriptor.params(), tokens, resolvers).map_err(|err| match err {
        ArgumentError::TooMany { .. } => ArgumentError::TooMany {
            usage: descriptor.usage().to_string(),
        },
        other => other,
    })?;
    trace!(
        trigger = descriptor.trigger(),
        values = bound.len(),
        "Bound handler arguments"
    );
    Ok(bound)
}

pub(crate) fn bind_tokens(
    params: &[ParamSpec],
    tokens: Vec<String>,
    resolvers: &ResolverRegistry,
) -> Result<BoundArgs, ArgumentError> {
    let mut bound = BoundArgs::new();
    let mut remaining = tokens.into_iter().peekable();

    for (index, spec) in params.iter().enumerate() {
        let ParamKind::Token {
            tag,
            required,
            vararg,
        } = spec.kind()
        else {
            continue;
        };
        let required = *required;

        if *vararg {
            let items = remaining
                .by_ref()
                .map(|token| resolve(spec, tag, &token, resolvers))
                .collect::<Result<Vec<_>, _>>()?;
            if items.is_empty() && required {
                return Err(missing(spec));
            }
            bound.push(ArgValue::List(items));
            break;
        }

        let is_tail = *tag == TypeTag::String && !params[index + 1..].iter().any(ParamSpec::is_token);
        if is_tail {
            let rest: Vec<String> = remaining.by_ref().collect();
            if rest.is_empty() {
                if required {
                    return Err(missing(spec));
                }
                bound.push(ArgValue::Absent);
            } else {
                bound.push(ArgValue::Text(rest.join(" ")));
            }
            continue;
        }

        match remaining.next() {
            Some(token) => bound.push(resolve(spec, tag, &token, resolvers)?),
            None if required => return Err(missing(spec)),
            None => bound.push(ArgValue::Absent),
        }
    }

    if remaining.peek().is_some() {
        return Err(ArgumentError::TooMany {
            usage: String::new(),
        });
    }

    Ok(bound)
}

fn resolve(
    spec: &ParamSpec,
    tag: &TypeTag,
    token: &str,
    resolvers: &ResolverRegistry,
) -> Result<ArgValue, ArgumentError> {
    resolvers
        .resolve(tag, token)
        .map_err(|reason| ArgumentError::Invalid {
            param: spec.display_name().to_string(),
            token: token.to_string(),
            reason,
        })
}

fn missing(spec: &ParamSpec) -> ArgumentError {
    ArgumentError::Missing {
        param: spec.display_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop() {}

    fn pay() -> HandlerDescriptor {
        HandlerDescriptor::builder(noop)
            .param(ParamSpec::actor())
            .param(ParamSpec::string("name"))
            .param(ParamSpec::int("amount"))
            .build("/pay")
            .unwrap()
    }

    #[test]
    fn test_bind_string_and_int() {
        let bound = bind(&pay(), "Alice 100", &ResolverRegistry::new()).unwrap();
        let values: Vec<_> = bound.iter().cloned().collect();
        assert_eq!(
            values,
            vec![ArgValue::Text("Alice".into()), ArgValue::Int(100)]
        );
    }

    #[test]
    fn test_missing_argument_names_param() {
        let err = bind(&pay(), "Alice", &ResolverRegistry::new()).unwrap_err();
        assert_eq!(
            err,
            ArgumentError::Missing {
                param: "amount".into()
            }
        );
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_invalid_argument() {
        let err = bind(&pay(), "Alice lots", &ResolverRegistry::new()).unwrap_err();
        assert_eq!(err.param(), Some("amount"));
        assert!(matches!(err, ArgumentError::Invalid { token, .. } if token == "lots"));
    }

    #[test]
    fn test_too_many_carries_usage() {
        let err = bind(&pay(), "Alice 100 extra", &ResolverRegistry::new()).unwrap_err();
        assert_eq!(
            err,
            ArgumentError::TooMany {
                usage: "/pay <name> <amount>".into()
            }
        );
    }

    #[test]
    fn test_greedy_text_tail() {
        let descriptor = HandlerDescriptor::builder(noop)
            .param(ParamSpec::mention("user"))
            .param(ParamSpec::string("reason").optional())
            .build("/ban")
            .unwrap();
        let resolvers = ResolverRegistry::new();

        let bound = bind(&descriptor, r#"@bob spamming   "the chat""#, &resolvers).unwrap();
        let values: Vec<_> = bound.iter().cloned().collect();
        assert_eq!(
            values,
            vec![
                ArgValue::Text("bob".into()),
                ArgValue::Text("spamming the chat".into())
            ]
        );

        let bound = bind(&descriptor, "@bob", &resolvers).unwrap();
        assert_eq!(bound.iter().nth(1), Some(&ArgValue::Absent));
    }

    #[test]
    fn test_required_tail_missing() {
        let descriptor = HandlerDescriptor::builder(noop)
            .param(ParamSpec::string("text"))
            .build("/echo")
            .unwrap();
        let err = bind(&descriptor, "  ", &ResolverRegistry::new()).unwrap_err();
        assert_eq!(err.param(), Some("text"));
    }

    #[test]
    fn test_vararg_consumes_rest() {
        let descriptor = HandlerDescriptor::builder(noop)
            .param(ParamSpec::string("label"))
            .param(ParamSpec::int("ids").vararg())
            .build("/tag")
            .unwrap();
        let resolvers = ResolverRegistry::new();

        let bound = bind(&descriptor, "urgent 1 2 3", &resolvers).unwrap();
        let values: Vec<_> = bound.iter().cloned().collect();
        assert_eq!(
            values,
            vec![
                ArgValue::Text("urgent".into()),
                ArgValue::List(vec![ArgValue::Int(1), ArgValue::Int(2), ArgValue::Int(3)])
            ]
        );

        let err = bind(&descriptor, "urgent 1 x", &resolvers).unwrap_err();
        assert_eq!(err.param(), Some("ids"));
        assert!(matches!(
            bind(&descriptor, "urgent", &resolvers).unwrap_err(),
            ArgumentError::Missing { .. }
        ));
    }

    #[test]
    fn test_optional_single_token() {
        let descriptor = HandlerDescriptor::builder(noop)
            .param(ParamSpec::int("page").optional())
            .param(ParamSpec::bool("verbose").optional())
            .build("/list")
            .unwrap();
        let bound = bind(&descriptor, "", &ResolverRegistry::new()).unwrap();
        let values: Vec<_> = bound.iter().cloned().collect();
        assert_eq!(values, vec![ArgValue::Absent, ArgValue::Absent]);
    }
}
