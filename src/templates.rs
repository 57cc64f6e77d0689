use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

pub const APP_WORKFLOW_YML: &str = include_str!("../templates/app_workflow.yml");
pub const PIPELINE_WORKFLOW_YML: &str = include_str!("../templates/pipeline_workflow.yml");

/// Substitute `{{name}}` tokens. GitHub expressions (`${{ ... }}`) never match
/// the token pattern and pass through as-is.
///
/// Every token in the template must have a value and every value must be
/// used, so a template edit cannot silently drop or leave a parameter.
pub fn render(template: &str, values: &BTreeMap<&str, String>) -> Result<String> {
    let pattern = Regex::new(r"\{\{([a-z_]+)\}\}").context("compile placeholder pattern")?;

    let used: BTreeSet<&str> = pattern
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    let missing: Vec<&str> = used
        .iter()
        .copied()
        .filter(|name| !values.contains_key(name))
        .collect();
    if !missing.is_empty() {
        return Err(anyhow!(
            "template placeholders without a value: {}",
            missing.join(", ")
        ));
    }
    let unused: Vec<&str> = values
        .keys()
        .copied()
        .filter(|name| !used.contains(name))
        .collect();
    if !unused.is_empty() {
        return Err(anyhow!(
            "values not referenced by the template: {}",
            unused.join(", ")
        ));
    }

    let rendered = pattern.replace_all(template, |caps: &regex::Captures<'_>| {
        values
            .get(&caps[1])
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    });
    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&'static str, &str)]) -> BTreeMap<&'static str, String> {
        pairs
            .iter()
            .map(|(key, value)| (*key, value.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_tokens_and_keeps_github_expressions() {
        let out = render(
            "name: {{app}}\nref: ${{ github.ref }}\nresult: ${{ needs.{{app}}.result }}\n",
            &values(&[("app", "web")]),
        )
        .expect("render");
        assert_eq!(
            out,
            "name: web\nref: ${{ github.ref }}\nresult: ${{ needs.web.result }}\n"
        );
    }

    #[test]
    fn missing_and_unused_values_are_errors() {
        let err = render("{{app}} {{directory}}", &values(&[("app", "web")]))
            .expect_err("missing directory");
        assert!(err.to_string().contains("directory"));

        let err = render("{{app}}", &values(&[("app", "web"), ("extra", "x")]))
            .expect_err("unused value");
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn embedded_templates_share_one_placeholder_set() {
        let pattern = Regex::new(r"\{\{([a-z_]+)\}\}").expect("pattern");
        let names = |text: &str| -> BTreeSet<String> {
            pattern
                .captures_iter(text)
                .map(|caps| caps[1].to_string())
                .collect()
        };
        let app = names(APP_WORKFLOW_YML);
        let pipeline = names(PIPELINE_WORKFLOW_YML);
        assert!(app.is_subset(&pipeline));
        assert!(pipeline.contains("project_key"));
        assert!(!app.contains("project_key"));
    }
}
