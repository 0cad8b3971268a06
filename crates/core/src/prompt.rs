//! Prompt templates and the renderer.
//!
//! Templates are loaded in layers (later layers override earlier ones by name):
//!
//! 1. **Built-in defaults**: `prompts/defaults.toml`, compiled into the binary
//! 2. **Prompt directory**: every `*.toml` file in the configured directory,
//!    in file-name order
//!
//! Each file is a flat table of `name = "template"` strings. A missing
//! directory is not an error; an unreadable or invalid file is.
//!
//! Placeholders are written `{name}`. `{{` and `}}` produce literal braces.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::PromptError;

const DEFAULTS: &str = include_str!("../prompts/defaults.toml");

/// Template names used by the agent.
pub mod names {
    pub const TOOL_SYSTEM: &str = "tool_system";
    pub const PLANNING: &str = "planning";
    pub const EXECUTION: &str = "execution";
    pub const REFLECTION: &str = "reflection";
    pub const FINAL_ANSWER: &str = "final_answer";
}

/// A named set of prompt templates.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    templates: BTreeMap<String, String>,
}

impl PromptLibrary {
    /// An empty library. Every render fails with `TemplateMissing`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in templates.
    pub fn builtin() -> Self {
        let mut lib = Self::empty();
        // The embedded file is covered by tests; a parse failure here is a build defect.
        if let Err(e) = lib.merge_toml(DEFAULTS, "<builtin>") {
            tracing::error!(error = %e, "Built-in prompts failed to parse");
        }
        lib
    }

    /// Built-in templates overlaid with the files in `dir`, if it exists.
    pub fn load(dir: Option<&Path>) -> Result<Self, PromptError> {
        let mut lib = Self::builtin();
        if let Some(dir) = dir {
            lib.load_dir(dir)?;
        }
        Ok(lib)
    }

    /// Overlay every `*.toml` file in `dir`.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, PromptError> {
        if !dir.is_dir() {
            info!(path = %dir.display(), "Prompt directory not found, using built-in prompts");
            return Ok(0);
        }

        let entries = std::fs::read_dir(dir).map_err(|e| PromptError::Load {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        let mut loaded = 0;
        for path in &files {
            let content = std::fs::read_to_string(path).map_err(|e| PromptError::Load {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            loaded += self.merge_toml(&content, &path.display().to_string())?;
        }
        debug!(files = files.len(), templates = loaded, "Loaded prompt overrides");
        Ok(loaded)
    }

    fn merge_toml(&mut self, content: &str, source: &str) -> Result<usize, PromptError> {
        let table: BTreeMap<String, String> = toml::from_str(content).map_err(|e| PromptError::Load {
            path: source.to_string(),
            reason: e.to_string(),
        })?;
        let count = table.len();
        self.templates.extend(table);
        Ok(count)
    }

    /// Add or replace a single template.
    pub fn insert(&mut self, name: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(name.into(), template.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Render the template `name`, substituting `vars`.
    ///
    /// Variables not referenced by the template are ignored.
    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| PromptError::TemplateMissing(name.to_string()))?;
        render_template(name, template, vars)
    }
}

fn render_template(name: &str, template: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
    let malformed = |offset| PromptError::Malformed {
        template: name.to_string(),
        offset,
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(malformed(i)),
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for (_, k) in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    key.push(k);
                }
                let key = key.trim();
                if !closed || key.is_empty() || key.contains('{') {
                    return Err(malformed(i));
                }
                let value = vars
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| *v)
                    .ok_or_else(|| PromptError::MissingVariable {
                        template: name.to_string(),
                        variable: key.to_string(),
                    })?;
                out.push_str(value);
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_templates_are_present() {
        let lib = PromptLibrary::builtin();
        for name in [
            names::TOOL_SYSTEM,
            names::PLANNING,
            names::EXECUTION,
            names::REFLECTION,
            names::FINAL_ANSWER,
        ] {
            assert!(lib.contains(name), "missing built-in prompt {name}");
        }
    }

    #[test]
    fn render_substitutes_variables() {
        let lib = PromptLibrary::builtin();
        let out = lib.render(names::PLANNING, &[("task", "pick a GPU")]).unwrap();
        assert!(out.contains("Task: pick a GPU"));
        assert!(!out.contains("{task}"));
    }

    #[test]
    fn builtin_tool_prompt_keeps_literal_braces() {
        let lib = PromptLibrary::builtin();
        let out = lib.render(names::TOOL_SYSTEM, &[("tools", "- get_performance_data")]).unwrap();
        assert!(out.contains(r#"<tool_call>{"name": "<tool name>", "arguments": {...}}</tool_call>"#));
    }

    #[test]
    fn missing_template_fails() {
        let lib = PromptLibrary::empty();
        let err = lib.render("planning", &[]).unwrap_err();
        assert_eq!(err, PromptError::TemplateMissing("planning".into()));
    }

    #[test]
    fn missing_variable_fails() {
        let mut lib = PromptLibrary::empty();
        lib.insert("t", "Step {step} of {total}");
        let err = lib.render("t", &[("step", "1")]).unwrap_err();
        assert_eq!(
            err,
            PromptError::MissingVariable { template: "t".into(), variable: "total".into() }
        );
    }

    #[test]
    fn escapes_and_malformed_placeholders() {
        let mut lib = PromptLibrary::empty();
        lib.insert("ok", "{{literal}} {x}");
        lib.insert("open", "value {x");
        lib.insert("close", "value }");
        lib.insert("blank", "value {}");

        assert_eq!(lib.render("ok", &[("x", "1")]).unwrap(), "{literal} 1");
        assert!(matches!(lib.render("open", &[("x", "1")]), Err(PromptError::Malformed { offset: 6, .. })));
        assert!(matches!(lib.render("close", &[]), Err(PromptError::Malformed { .. })));
        assert!(matches!(lib.render("blank", &[]), Err(PromptError::Malformed { .. })));
    }

    #[test]
    fn extra_variables_are_ignored() {
        let mut lib = PromptLibrary::empty();
        lib.insert("t", "hello {name}");
        let out = lib.render("t", &[("name", "world"), ("unused", "x")]).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn directory_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("custom.toml"), "planning = \"Plan: {task}\"\nextra = \"x\"\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let lib = PromptLibrary::load(Some(dir.path())).unwrap();
        assert_eq!(lib.render("planning", &[("task", "t")]).unwrap(), "Plan: t");
        assert!(lib.contains("extra"));
        assert!(lib.contains(names::EXECUTION));
    }

    #[test]
    fn missing_directory_uses_builtin() {
        let lib = PromptLibrary::load(Some(Path::new("/definitely/not/here"))).unwrap();
        assert!(lib.contains(names::PLANNING));
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.toml"), "planning = [1, 2]").unwrap();
        let err = PromptLibrary::load(Some(dir.path())).unwrap_err();
        assert!(matches!(err, PromptError::Load { .. }));
    }
}
