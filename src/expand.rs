// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Placeholder expansion.
//!
//! Stage settings may refer to one another through placeholders of the form
//! `%(key)s`. Expansion substitutes every placeholder with the current value
//! of the named setting, then repeats on the result until nothing changes
//! anymore, i.e., until a fixed point is reached. Settings can thus be built
//! out of settings that are themselves built out of other settings.
//!
//! # Termination
//!
//! Expansion gives up after [`MAX_PASSES`] substitution passes. Placeholders
//! that refer to each other, e.g., `a = "%(b)s"` and `b = "%(a)s"`, never
//! reach a fixed point and are reported as [`ExpandError::TemplateCycle`]. A
//! setting that expands to its own placeholder reaches a "fixed point" that
//! still holds placeholders, which is reported the same way.
//!
//! # Escapes
//!
//! A doubled `%%` is never the start of a placeholder. It survives every
//! pass and becomes a single `%` once the fixed point is reached, so
//! `%%(key)s` yields the literal text `%(key)s`.

use crate::{
    config::{Settings, Value},
    profile::Profile,
};

use regex::Regex;
use std::sync::LazyLock;

/// Upper bound on substitution passes for a single value.
pub const MAX_PASSES: usize = 25;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%(?:%|\(([A-Za-z_][A-Za-z0-9_]*)\)s)").expect("placeholder pattern must compile")
});

/// Expand value against settings of a profile.
///
/// Text stays text, paths stay paths, and every item of a list is expanded
/// on its own. Values without placeholders or `%%` escapes are returned
/// unchanged.
///
/// # Errors
///
/// - Return [`ExpandError::UnresolvedKey`] if a placeholder names a setting
///   the profile does not have.
/// - Return [`ExpandError::ListPlaceholder`] if a placeholder names a list
///   setting.
/// - Return [`ExpandError::TemplateCycle`] if no fixed point is reached.
pub fn expand(value: &Value, profile: &Profile) -> Result<Value> {
    expand_with(value, profile.settings())
}

/// Expand value against raw settings.
///
/// # Errors
///
/// - See [`expand`].
pub fn expand_with(value: &Value, settings: &Settings) -> Result<Value> {
    match value {
        Value::Text(text) => expand_text(text, settings).map(Value::Text),
        Value::Path { path } => {
            expand_text(path.to_string_lossy().as_ref(), settings).map(Value::path)
        }
        Value::List(items) => items
            .iter()
            .map(|item| expand_text(item, settings))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
    }
}

/// Expand placeholders of template text until a fixed point.
///
/// # Errors
///
/// - See [`expand`].
pub fn expand_text(template: &str, settings: &Settings) -> Result<String> {
    if !PLACEHOLDER.is_match(template) {
        return Ok(template.to_string());
    }

    let mut current = template.to_string();
    for _ in 0..MAX_PASSES {
        let next = substitute(&current, settings)?;
        if next == current {
            // INVARIANT: A fixed point must be free of placeholders.
            if has_placeholder(&next) {
                return Err(ExpandError::TemplateCycle {
                    template: template.to_string(),
                    passes: MAX_PASSES,
                });
            }

            return Ok(next.replace("%%", "%"));
        }
        current = next;
    }

    Err(ExpandError::TemplateCycle {
        template: template.to_string(),
        passes: MAX_PASSES,
    })
}

/// Check if text contains at least one placeholder.
///
/// Escaped `%%` does not count.
pub fn has_placeholder(text: &str) -> bool {
    PLACEHOLDER
        .captures_iter(text)
        .any(|captures| captures.get(1).is_some())
}

// Single substitution pass over every placeholder in text.
fn substitute(text: &str, settings: &Settings) -> Result<String> {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for captures in PLACEHOLDER.captures_iter(text) {
        // INVARIANT: Escapes stay doubled until the fixed point is reached.
        let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let key = key.as_str();
        let value = settings
            .get(key)
            .ok_or_else(|| ExpandError::UnresolvedKey {
                key: key.to_string(),
                template: text.to_string(),
            })?
            .as_scalar()
            .ok_or_else(|| ExpandError::ListPlaceholder {
                key: key.to_string(),
            })?;

        output.push_str(&text[last..whole.start()]);
        output.push_str(&value);
        last = whole.end();
    }
    output.push_str(&text[last..]);

    Ok(output)
}

/// Placeholder expansion error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    /// Expansion never settled on a placeholder-free value.
    #[error("placeholder cycle in {template:?}, no fixed point after {passes} passes")]
    TemplateCycle { template: String, passes: usize },

    /// Placeholder refers to a setting that does not exist.
    #[error("placeholder %({key})s in {template:?} refers to unknown setting")]
    UnresolvedKey { key: String, template: String },

    /// Placeholder refers to a list setting, which has no text form.
    #[error("placeholder %({key})s refers to a list setting")]
    ListPlaceholder { key: String },
}

/// Friendly result alias :3
pub type Result<T, E = ExpandError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn settings(pairs: &[(&str, Value)]) -> Settings {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn limn_settings() -> Settings {
        settings(&[
            ("local_tmp", Value::path("tmp")),
            ("dist", Value::path("dist")),
            ("work_dir", Value::path("%(local_tmp)s/%(dist)s")),
            ("vendor_bundle", Value::path("%(work_dir)s/vendor/vendor-bundle.min.js")),
            ("project_name", Value::text("Limn")),
            ("banner", Value::text("%(project_name)s lives in %(work_dir)s")),
            ("hosts", Value::list(["h1", "h2"])),
        ])
    }

    #[test_case("plain text", "plain text"; "no placeholder")]
    #[test_case("%(project_name)s", "Limn"; "single placeholder")]
    #[test_case("%(banner)s!", "Limn lives in tmp/dist!"; "nested placeholders")]
    #[test_case("100%(s) and %s", "100%(s) and %s"; "not a placeholder")]
    #[test_case("50%% of %(project_name)s", "50% of Limn"; "escaped percent")]
    #[test_case("%%(project_name)s", "%(project_name)s"; "escaped placeholder")]
    #[test_case("100%%", "100%"; "escape only")]
    #[test]
    fn expand_text_to_fixed_point(template: &str, expect: &str) {
        let result = expand_text(template, &limn_settings()).unwrap();
        pretty_assertions::assert_eq!(result, expect);
    }

    #[test]
    fn expansion_is_idempotent() -> anyhow::Result<()> {
        let settings = limn_settings();
        for value in settings.values() {
            let once = expand_with(value, &settings)?;
            let twice = expand_with(&once, &settings)?;
            assert_eq!(once, twice);
        }

        Ok(())
    }

    #[test]
    fn expansion_preserves_value_shape() -> anyhow::Result<()> {
        let settings = limn_settings();

        let result = expand_with(&Value::path("%(vendor_bundle)s"), &settings)?;
        assert_eq!(result, Value::path("tmp/dist/vendor/vendor-bundle.min.js"));

        let result = expand_with(&Value::text("%(work_dir)s"), &settings)?;
        assert_eq!(result, Value::text("tmp/dist"));

        let result = expand_with(&Value::list(["%(dist)s", "static"]), &settings)?;
        assert_eq!(result, Value::list(["dist", "static"]));

        Ok(())
    }

    #[test]
    fn escape_inside_referenced_setting() -> anyhow::Result<()> {
        let settings = settings(&[
            ("share", Value::text("50%%")),
            ("literal", Value::text("%%(share)s")),
        ]);

        assert_eq!(expand_text("%(share)s cut", &settings)?, "50% cut");
        assert_eq!(expand_text("%(literal)s", &settings)?, "%(share)s");
        assert!(!has_placeholder("%%(share)s"));

        Ok(())
    }

    #[test]
    fn mutual_placeholders_are_a_cycle() {
        let settings = settings(&[("a", Value::text("%(b)s")), ("b", Value::text("%(a)s"))]);
        let result = expand_text("%(a)s", &settings);
        assert!(matches!(result, Err(ExpandError::TemplateCycle { .. })));
    }

    #[test]
    fn self_placeholder_is_a_cycle() {
        let settings = settings(&[("a", Value::text("%(a)s"))]);
        let result = expand_text("%(a)s", &settings);
        assert!(matches!(result, Err(ExpandError::TemplateCycle { .. })));
    }

    #[test]
    fn growing_placeholder_is_a_cycle() {
        let settings = settings(&[("a", Value::text("x%(a)s"))]);
        let result = expand_text("%(a)s", &settings);
        assert_eq!(
            result,
            Err(ExpandError::TemplateCycle {
                template: "%(a)s".into(),
                passes: MAX_PASSES
            })
        );
    }

    #[test]
    fn unknown_setting_is_reported() {
        let result = expand_text("%(nope)s/var", &limn_settings());
        assert_eq!(
            result,
            Err(ExpandError::UnresolvedKey {
                key: "nope".into(),
                template: "%(nope)s/var".into()
            })
        );
    }

    #[test]
    fn list_setting_cannot_be_placeholder() {
        let result = expand_text("deploy to %(hosts)s", &limn_settings());
        assert_eq!(
            result,
            Err(ExpandError::ListPlaceholder {
                key: "hosts".into()
            })
        );
    }
}
