//! Variable scopes and template substitution

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::value::Value;

/// Variables as written in a test description
pub type Variables = BTreeMap<String, Value>;

/// `$$`, `$name` or `${name}`
fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:(\$)|([_A-Za-z][_A-Za-z0-9]*)|\{([_A-Za-z][_A-Za-z0-9]*)\})")
            .expect("placeholder pattern is valid")
    })
}

/// Variable bindings visible to a step
///
/// Scopes are values: [`Scope::branch`] returns a new scope and never
/// touches the one it was called on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    vars: Variables,
}

impl Scope {
    /// Build the scope for one test iteration; test-level overrides win
    pub fn new(globals: &Variables, overrides: &Variables) -> Self {
        let mut vars = globals.clone();
        vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Copy of this scope with `name` bound to `value`
    pub fn branch(&self, name: &str, value: Value) -> Scope {
        let mut vars = self.vars.clone();
        vars.insert(name.to_string(), value);
        Scope { vars }
    }

    /// Replace `$name` / `${name}` with bound values and `$$` with `$`
    ///
    /// Unknown names and anything else following a `$` (such as the `$[n]`
    /// parameter markers) are left as written.
    pub fn substitute<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if !text.contains('$') {
            return Cow::Borrowed(text);
        }

        placeholder_pattern().replace_all(text, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                return "$".to_string();
            }
            let name = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match self.vars.get(name) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(pairs: &[(&str, Value)]) -> Scope {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Scope::new(&vars, &Variables::new())
    }

    #[test]
    fn test_text_without_placeholders_is_identity() {
        let s = scope(&[("table", "t".into())]);
        for text in ["", "select 1", "select * from t where a = 'x'"] {
            let out = s.substitute(text);
            assert!(matches!(out, Cow::Borrowed(_)));
            assert_eq!(out, text);
        }
    }

    #[test]
    fn test_both_placeholder_forms() {
        let s = scope(&[("table", "trades".into()), ("n", 3.into())]);
        assert_eq!(
            s.substitute("select * from ${table} limit $n"),
            "select * from trades limit 3"
        );
        assert_eq!(s.substitute("${table}_archive"), "trades_archive");
    }

    #[test]
    fn test_undefined_names_left_verbatim() {
        let s = scope(&[("a", 1.into())]);
        assert_eq!(s.substitute("$a ${b} $c"), "1 ${b} $c");
    }

    #[test]
    fn test_parameter_markers_untouched() {
        let s = scope(&[("a", 1.into())]);
        assert_eq!(
            s.substitute("insert into t values ($[1], $[2])"),
            "insert into t values ($[1], $[2])"
        );
    }

    #[test]
    fn test_dollar_escape() {
        let s = scope(&[("price", 10.into())]);
        assert_eq!(s.substitute("cost $$$price"), "cost $10");
        assert_eq!(s.substitute("$$price"), "$price");
    }

    #[test]
    fn test_value_rendering_in_templates() {
        let s = scope(&[
            ("f", Value::Float(2.0)),
            ("b", Value::Bool(true)),
            ("l", Value::List(vec![1.into(), "x".into()])),
        ]);
        assert_eq!(s.substitute("$f $b $l"), "2.0 true [1, 'x']");
    }

    #[test]
    fn test_overrides_win() {
        let mut globals = Variables::new();
        globals.insert("table".into(), "global".into());
        globals.insert("keep".into(), 1.into());
        let mut overrides = Variables::new();
        overrides.insert("table".into(), "local".into());

        let s = Scope::new(&globals, &overrides);
        assert_eq!(s.get("table"), Some(&Value::from("local")));
        assert_eq!(s.get("keep"), Some(&Value::Int(1)));
        assert_eq!(s.get("missing"), None);
    }

    #[test]
    fn test_branch_does_not_touch_parent() {
        let parent = scope(&[("i", 0.into())]);
        let child = parent.branch("i", 5.into());
        let grandchild = child.branch("j", 6.into());

        assert_eq!(parent.get("i"), Some(&Value::Int(0)));
        assert_eq!(parent.get("j"), None);
        assert_eq!(child.get("i"), Some(&Value::Int(5)));
        assert_eq!(child.get("j"), None);
        assert_eq!(grandchild.get("i"), Some(&Value::Int(5)));
        assert_eq!(grandchild.get("j"), Some(&Value::Int(6)));
    }
}
