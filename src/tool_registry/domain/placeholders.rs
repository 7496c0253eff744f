//! Placeholder substitution for per-user server configuration.
//!
//! Three forms are recognised inside `args`, `env` values, `url` and
//! `headers` values:
//!
//! - `{{USER_ID}}`: the id of the user the connection is opened for.
//! - `{{NAME}}`: a value supplied for a declared custom user variable.
//! - `${NAME}`: a process environment variable.
//!
//! References that cannot be resolved are left in place. Configurations
//! owned by a user resolve with [`PlaceholderContext::for_user`], which never
//! reads the process environment.

use std::collections::BTreeMap;

const USER_ID_VARIABLE: &str = "USER_ID";

/// Returns whether `value` contains any placeholder syntax.
#[must_use]
pub fn contains_placeholder(value: &str) -> bool {
    value.contains("{{") || value.contains("${")
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum EnvSource {
    #[default]
    Process,
    Fixed(BTreeMap<String, String>),
    Disabled,
}

impl EnvSource {
    fn lookup(&self, name: &str) -> Option<String> {
        match self {
            Self::Process => std::env::var(name).ok(),
            Self::Fixed(values) => values.get(name).cloned(),
            Self::Disabled => None,
        }
    }
}

/// Values available while resolving placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaceholderContext {
    user_id: Option<String>,
    custom_vars: BTreeMap<String, String>,
    env: EnvSource,
}

impl PlaceholderContext {
    /// Creates a context reading `${..}` from the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context for a configuration owned by `user_id`.
    ///
    /// `${..}` references stay unresolved; only `{{USER_ID}}` and the
    /// user's own custom variables are substituted.
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            custom_vars: BTreeMap::new(),
            env: EnvSource::Disabled,
        }
    }

    /// Sets the value of `{{USER_ID}}`.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Adds a custom user variable.
    #[must_use]
    pub fn with_custom_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_vars.insert(name.into(), value.into());
        self
    }

    /// Replaces the process environment with a fixed map.
    #[must_use]
    pub fn with_fixed_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = EnvSource::Fixed(values.into_iter().collect());
        self
    }

    /// Substitutes every resolvable placeholder in `input`.
    #[must_use]
    pub fn resolve(&self, input: &str) -> String {
        if !contains_placeholder(input) {
            return input.to_owned();
        }
        let with_env = substitute(input, "${", "}", |name| self.env.lookup(name));
        substitute(&with_env, "{{", "}}", |name| self.user_variable(name))
    }

    fn user_variable(&self, name: &str) -> Option<String> {
        if name == USER_ID_VARIABLE {
            return self.user_id.clone();
        }
        self.custom_vars.get(name).cloned()
    }
}

fn substitute(
    input: &str,
    open: &str,
    close: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some((before, after_open)) = rest.split_once(open) {
        output.push_str(before);
        let Some((name, after_close)) = after_open.split_once(close) else {
            output.push_str(open);
            rest = after_open;
            break;
        };
        if let Some(value) = lookup(name.trim()) {
            output.push_str(&value);
        } else {
            output.push_str(open);
            output.push_str(name);
            output.push_str(close);
        }
        rest = after_close;
    }
    output.push_str(rest);
    output
}
