// SPDX-License-Identifier: MIT

//! Static checks on generated chart scripts
//!
//! Scripts may only import plotting and number-crunching modules and may not
//! reach for the interpreter's escape hatches (`open`, `exec`, dunder
//! attributes and friends). The check is line based and deliberately
//! conservative: a false rejection only costs the run its charts.

use crate::adk::error::SandboxError;
use once_cell::sync::Lazy;
use regex::Regex;

static FORBIDDEN_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(open|exec|eval|compile|__import__|getattr|setattr|delattr|globals|locals|vars|input|breakpoint)\s*\(",
    )
    .expect("forbidden-call pattern is valid")
});

/// `import a, b as c` at the start of a statement, including after `;` or
/// the `:` of a one-line compound statement
static IMPORT_STMT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[;:])\s*import\s+([^;]+)").expect("import pattern is valid")
});

static FROM_IMPORT_STMT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[;:])\s*from\s+(\S+)\s+import\b").expect("from-import pattern is valid")
});

static DUNDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__\w+__").expect("dunder pattern is valid"));

/// Modules a chart script may import (matched on the top-level package)
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    "matplotlib",
    "numpy",
    "math",
    "random",
    "datetime",
    "statistics",
];

const ALLOWED_DUNDERS: &[&str] = &["__name__", "__main__"];

/// Allow-list policy for generated scripts
#[derive(Debug, Clone)]
pub struct ScriptPolicy {
    allowed_modules: Vec<String>,
    max_bytes: usize,
}

impl Default for ScriptPolicy {
    fn default() -> Self {
        Self {
            allowed_modules: DEFAULT_ALLOWED_MODULES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            max_bytes: 64 * 1024,
        }
    }
}

impl ScriptPolicy {
    /// Reject scripts that step outside the plotting surface
    pub fn check(&self, script: &str) -> Result<(), SandboxError> {
        if script.trim().is_empty() {
            return Err(SandboxError::PolicyViolation("script is empty".to_string()));
        }
        if script.len() > self.max_bytes {
            return Err(SandboxError::PolicyViolation(format!(
                "script is {} bytes, limit is {}",
                script.len(),
                self.max_bytes
            )));
        }

        for (lineno, raw) in script.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            for module in imported_modules(line) {
                let root = module.split('.').next().unwrap_or(module);
                if !self.allowed_modules.iter().any(|m| m == root) {
                    return Err(SandboxError::PolicyViolation(format!(
                        "line {}: import of '{}' is not allowed",
                        lineno + 1,
                        module
                    )));
                }
            }

            if let Some(m) = FORBIDDEN_CALL.captures(line) {
                return Err(SandboxError::PolicyViolation(format!(
                    "line {}: call to '{}' is not allowed",
                    lineno + 1,
                    &m[1]
                )));
            }

            if let Some(m) = DUNDER
                .find_iter(line)
                .find(|m| !ALLOWED_DUNDERS.contains(&m.as_str()))
            {
                return Err(SandboxError::PolicyViolation(format!(
                    "line {}: access to '{}' is not allowed",
                    lineno + 1,
                    m.as_str()
                )));
            }
        }

        Ok(())
    }
}

/// Drop a trailing `#` comment unless the hash sits inside a string literal
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '#') => return &line[..i],
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
    }
    line
}

/// Module names named by any `import` or `from ... import` statement on the line
fn imported_modules(line: &str) -> Vec<&str> {
    let mut modules: Vec<&str> = IMPORT_STMT
        .captures_iter(line)
        .filter_map(|c| c.get(1))
        .flat_map(|m| m.as_str().split(','))
        .filter_map(|item| item.split_whitespace().next())
        .map(|name| name.trim_matches(|c| c == '(' || c == ')'))
        .collect();
    modules.extend(
        FROM_IMPORT_STMT
            .captures_iter(line)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str()),
    );
    modules
}
