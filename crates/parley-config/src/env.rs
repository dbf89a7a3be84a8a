use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Matches `{{ env.NAME }}` with an optional `| default("value")` filter
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
            .expect("placeholder pattern is a valid regex")
    })
}

/// Expand `{{ env.VAR }}` placeholders in raw TOML text
///
/// `{{ env.VAR | default("x") }}` falls back to `x` when the variable is
/// unset. Comment lines are copied through untouched so commented-out keys
/// never require their variables.
pub fn expand_env(input: &str) -> Result<String, String> {
    let expanded: Vec<String> = input
        .split('\n')
        .map(|line| {
            if line.trim_start().starts_with('#') {
                Ok(line.to_owned())
            } else {
                expand_line(line)
            }
        })
        .collect::<Result<_, _>>()?;

    Ok(expanded.join("\n"))
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut failure = None;

    let replaced = placeholder().replace_all(line, |caps: &Captures<'_>| {
        let key = &caps[1];
        let fallback = caps.get(2).map(|m| m.as_str());

        match resolve(key, fallback) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(replaced.into_owned()),
    }
}

fn resolve(key: &str, fallback: Option<&str>) -> Result<String, String> {
    let Some(var_name) = key.strip_prefix("env.").filter(|rest| !rest.is_empty() && !rest.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var_name), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{var_name}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "type = \"openai\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn expands_variables_across_lines() {
        let vars = [("PARLEY_A", Some("alpha")), ("PARLEY_B", Some("beta"))];
        temp_env::with_vars(vars, || {
            let result = expand_env("a = \"{{ env.PARLEY_A }}\"\nb = \"{{env.PARLEY_B}}\"").unwrap();
            assert_eq!(result, "a = \"alpha\"\nb = \"beta\"");
        });
    }

    #[test]
    fn missing_variable_names_the_variable() {
        temp_env::with_var_unset("PARLEY_MISSING", || {
            let err = expand_env("key = \"{{ env.PARLEY_MISSING }}\"").unwrap_err();
            assert!(err.contains("PARLEY_MISSING"));
        });
    }

    #[test]
    fn non_env_scope_rejected() {
        let err = expand_env("key = \"{{ vault.KEY }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn comments_are_not_expanded() {
        temp_env::with_var_unset("PARLEY_MISSING", || {
            let input = "  # api_key = \"{{ env.PARLEY_MISSING }}\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("PARLEY_OPTIONAL", || {
            let result = expand_env("k = \"{{ env.PARLEY_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "k = \"fallback\"");
        });

        temp_env::with_var("PARLEY_OPTIONAL", Some("set"), || {
            let result = expand_env("k = \"{{ env.PARLEY_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "k = \"set\"");
        });
    }

    #[test]
    fn trailing_newline_preserved() {
        assert_eq!(expand_env("a = 1\n").unwrap(), "a = 1\n");
    }
}
