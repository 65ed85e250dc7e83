//! Trigger registry with longest-match routing.
//!
//! Triggers are normalized (lower-cased, whitespace collapsed) and frozen
//! into a [`TriggerRegistry`] at composition time. Lookup tries an exact hit
//! first and then scans keys from longest to shortest, so a subcommand such
//! as `/settings audio` wins over its root `/settings`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{DescriptorBuilder, HandlerDescriptor, normalize};
use crate::error::DescriptorError;

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub descriptor: &'a Arc<HandlerDescriptor>,
    /// What follows the trigger words in the original text, case preserved.
    pub args: &'a str,
}

/// Mutable registry used during composition.
#[derive(Debug, Default)]
pub struct TriggerRegistryBuilder {
    entries: HashMap<String, Arc<HandlerDescriptor>>,
    bot_username: Option<String>,
}

impl TriggerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands addressed as `/cmd@name` are accepted only for this name.
    pub fn bot_username(mut self, username: impl Into<String>) -> Self {
        let username = username.into();
        let username = username.trim_start_matches('@').to_lowercase();
        self.bot_username = (!username.is_empty()).then_some(username);
        self
    }

    /// Inserts or replaces the descriptor for its trigger.
    pub fn register(&mut self, descriptor: HandlerDescriptor) {
        let key = descriptor.trigger().to_string();
        if self.entries.insert(key.clone(), Arc::new(descriptor)).is_some() {
            debug!(trigger = %key, "Overriding previously registered trigger");
        }
    }

    /// Builds `descriptor` for `trigger` and registers it.
    pub fn command(
        &mut self,
        trigger: &str,
        descriptor: DescriptorBuilder,
    ) -> Result<(), DescriptorError> {
        self.register(descriptor.build(trigger)?);
        Ok(())
    }

    pub(crate) fn descriptors(&self) -> impl Iterator<Item = &Arc<HandlerDescriptor>> {
        self.entries.values()
    }

    pub fn build(self) -> TriggerRegistry {
        let mut ordered: Vec<String> = self.entries.keys().cloned().collect();
        ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        TriggerRegistry {
            exact: self.entries,
            ordered,
            bot_username: self.bot_username,
        }
    }
}

/// A group of commands under one root, such as `/settings` and
/// `/settings audio`.
pub struct CommandGroup {
    root: String,
    default: Option<DescriptorBuilder>,
    subcommands: Vec<(String, DescriptorBuilder)>,
}

impl CommandGroup {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default: None,
            subcommands: Vec::new(),
        }
    }

    /// Handler for the root with no subcommand.
    pub fn default(mut self, descriptor: DescriptorBuilder) -> Self {
        self.default = Some(descriptor);
        self
    }

    pub fn sub(mut self, path: impl Into<String>, descriptor: DescriptorBuilder) -> Self {
        self.subcommands.push((path.into(), descriptor));
        self
    }

    pub(crate) fn register_into(
        self,
        registry: &mut TriggerRegistryBuilder,
    ) -> Result<(), DescriptorError> {
        if let Some(default) = self.default {
            registry.command(&self.root, default)?;
        }
        for (path, descriptor) in self.subcommands {
            registry.command(&format!("{} {path}", self.root), descriptor)?;
        }
        Ok(())
    }
}

/// Immutable trigger table.
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    exact: HashMap<String, Arc<HandlerDescriptor>>,
    /// Keys by descending length, then lexicographically.
    ordered: Vec<String>,
    bot_username: Option<String>,
}

impl TriggerRegistry {
    pub fn builder() -> TriggerRegistryBuilder {
        TriggerRegistryBuilder::new()
    }

    /// Finds the descriptor whose trigger is the longest word-aligned prefix
    /// of `text`.
    pub fn find_match<'a>(&'a self, text: &'a str) -> Option<RouteMatch<'a>> {
        let text = self.strip_bot_address(text)?;
        let normalized = normalize(&text.command);

        let key = if self.exact.contains_key(&normalized) {
            normalized.as_str()
        } else {
            self.ordered
                .iter()
                .map(String::as_str)
                .find(|k| is_word_prefix(k, &normalized))?
        };

        let (key, descriptor) = self.exact.get_key_value(key)?;
        Some(RouteMatch {
            descriptor,
            args: skip_words(text.original, trigger_words(key)),
        })
    }

    /// All descriptors, ordered by trigger.
    pub fn descriptors(&self) -> Vec<&Arc<HandlerDescriptor>> {
        let mut all: Vec<_> = self.exact.values().collect();
        all.sort_by(|a, b| a.trigger().cmp(b.trigger()));
        all
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    /// Removes `@botname` from a leading `/cmd@botname` token.
    ///
    /// Returns `None` when the command is addressed to another bot.
    fn strip_bot_address<'a>(&self, text: &'a str) -> Option<Addressed<'a>> {
        let trimmed = text.trim_start();
        let first = trimmed.split_whitespace().next().unwrap_or_default();

        let (Some(username), true) = (self.bot_username.as_deref(), first.starts_with('/')) else {
            return Some(Addressed::plain(text));
        };
        let Some((command, target)) = first.split_once('@') else {
            return Some(Addressed::plain(text));
        };
        if !target.eq_ignore_ascii_case(username) {
            debug!(addressed_to = target, "Command addressed to another bot");
            return None;
        }

        let rest = &trimmed[first.len()..];
        Some(Addressed {
            command: format!("{command}{rest}"),
            original: text,
        })
    }
}

/// Text with any bot address removed from the command token.
struct Addressed<'a> {
    command: String,
    original: &'a str,
}

impl<'a> Addressed<'a> {
    fn plain(text: &'a str) -> Self {
        Self {
            command: text.to_string(),
            original: text,
        }
    }
}

fn is_word_prefix(key: &str, text: &str) -> bool {
    text.strip_prefix(key)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
}

/// Returns what follows the first `n` whitespace-separated words, with
/// leading whitespace removed.
fn trigger_words(key: &str) -> usize {
    key.split_whitespace().count()
}

fn skip_words(text: &str, n: usize) -> &str {
    let mut rest = text.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = rest[end..].trim_start();
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop() {}

    fn registry(triggers: &[&str]) -> TriggerRegistry {
        let mut builder = TriggerRegistry::builder();
        for trigger in triggers {
            builder
                .command(trigger, HandlerDescriptor::builder(noop))
                .unwrap();
        }
        builder.build()
    }

    fn matched<'a>(registry: &'a TriggerRegistry, text: &'a str) -> Option<(&'a str, &'a str)> {
        registry
            .find_match(text)
            .map(|m| (m.descriptor.trigger(), m.args))
    }

    #[test]
    fn test_longest_match_wins() {
        let registry = registry(&["/a", "/a b", "/ab"]);
        assert_eq!(matched(&registry, "/a b extra"), Some(("/a b", "extra")));
        assert_eq!(matched(&registry, "/ab"), Some(("/ab", "")));
        assert_eq!(matched(&registry, "/a"), Some(("/a", "")));
        assert_eq!(matched(&registry, "/a c"), Some(("/a", "c")));
    }

    #[test]
    fn test_prefix_must_end_at_word_boundary() {
        let registry = registry(&["/test"]);
        assert_eq!(matched(&registry, "/testing"), None);
        assert_eq!(matched(&registry, "/test ing"), Some(("/test", "ing")));
    }

    #[test]
    fn test_normalization_preserves_argument_case() {
        let registry = registry(&["/settings audio"]);
        assert_eq!(
            matched(&registry, "  /SETTINGS   Audio  Loud \"Rock Mix\""),
            Some(("/settings audio", "Loud \"Rock Mix\""))
        );
    }

    #[test]
    fn test_last_registration_wins() {
        async fn other() -> &'static str {
            "other"
        }

        let mut builder = TriggerRegistry::builder();
        builder
            .command("/start", HandlerDescriptor::builder(noop))
            .unwrap();
        builder
            .command(
                "/START",
                HandlerDescriptor::builder(other).describe("override"),
            )
            .unwrap();
        let registry = builder.build();

        assert_eq!(registry.len(), 1);
        let m = registry.find_match("/start").unwrap();
        assert_eq!(m.descriptor.description(), Some("override"));
    }

    #[test]
    fn test_group_without_default() {
        let mut builder = TriggerRegistry::builder();
        CommandGroup::new("/settings")
            .sub("audio", HandlerDescriptor::builder(noop))
            .register_into(&mut builder)
            .unwrap();
        let registry = builder.build();

        assert_eq!(matched(&registry, "/settings audio"), Some(("/settings audio", "")));
        assert_eq!(matched(&registry, "/settings video"), None);
        assert_eq!(matched(&registry, "/settings"), None);
    }

    #[test]
    fn test_group_with_default() {
        let mut builder = TriggerRegistry::builder();
        CommandGroup::new("/settings")
            .default(HandlerDescriptor::builder(noop))
            .sub("audio", HandlerDescriptor::builder(noop))
            .register_into(&mut builder)
            .unwrap();
        let registry = builder.build();

        assert_eq!(matched(&registry, "/settings video"), Some(("/settings", "video")));
    }

    #[test]
    fn test_bot_address() {
        let mut builder = TriggerRegistry::builder().bot_username("@CourierBot");
        builder
            .command("/start", HandlerDescriptor::builder(noop))
            .unwrap();
        let registry = builder.build();

        assert_eq!(matched(&registry, "/start@courierbot now"), Some(("/start", "now")));
        assert_eq!(matched(&registry, "/start@OtherBot"), None);
        assert_eq!(matched(&registry, "/start"), Some(("/start", "")));
    }

    #[test]
    fn test_descriptors_sorted() {
        let registry = registry(&["/b", "/a b", "/a"]);
        let triggers: Vec<_> = registry
            .descriptors()
            .into_iter()
            .map(|d| d.trigger())
            .collect();
        assert_eq!(triggers, vec!["/a", "/a b", "/b"]);
    }

    #[test]
    fn test_skip_words() {
        assert_eq!(skip_words("  /pay   Alice  100", 1), "Alice  100");
        assert_eq!(skip_words("/pay", 1), "");
        assert_eq!(skip_words("/a b", 3), "");
    }

    #[test]
    fn test_trigger_words() {
        assert_eq!(trigger_words("/settings audio"), 2);
        assert_eq!(trigger_words(""), 0);
        assert_eq!(skip_words("/pay Alice", trigger_words("")), "/pay Alice");
    }
}
