use crate::errors::{PanelError, PanelResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

/// Preamble prepended to any schema text that lacks generator/datasource
/// declarations. The client output path is relative to the `prisma/` dir.
pub const CANONICAL_PREAMBLE: &str = r#"generator client {
  provider = "prisma-client-js"
  output   = "../generated/client"
}

datasource db {
  provider = "mongodb"
  url      = env("DATABASE_URL")
}
"#;

static MODEL_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"model\s+(\w+)\s*\{").expect("model header regex")
});

static GENERATOR_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?m)(^|\n)\s*generator\s+client\s*\{").expect("generator regex")
});

static DATASOURCE_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?m)(^|\n)\s*datasource\s+db\s*\{").expect("datasource regex")
});

static FIELD_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^\s*(\w+)\s+(\w+)\??").expect("field line regex")
});

/// One `name type` line extracted from a model body, system fields excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub ty: String,
    pub required: bool,
}

/// A named model block located inside the schema text.
#[derive(Debug, Clone)]
pub struct ModelBlock {
    pub name: String,
    /// Byte span from the `model` keyword through the closing brace.
    span: Range<usize>,
    /// Byte span of the body between the braces.
    body: Range<usize>,
}

/// What a merge did to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Block existed with an identical field set; text untouched.
    Unchanged,
    /// Block existed and was replaced in place.
    Replaced,
    /// Block was appended at end of file.
    Appended,
}

impl MergeOutcome {
    #[must_use]
    pub fn changed(&self) -> bool {
        !matches!(self, MergeOutcome::Unchanged)
    }
}

/// Parsed schema document. All mutation goes through methods that splice the
/// text and re-locate the blocks, so callers never handle byte offsets.
#[derive(Debug, Clone)]
pub struct SchemaDoc {
    text: String,
    models: Vec<ModelBlock>,
}

impl SchemaDoc {
    #[must_use]
    pub fn parse(text: impl Into<String>) -> Self {
        let mut doc = SchemaDoc {
            text: text.into(),
            models: Vec::new(),
        };
        doc.reparse();
        doc
    }

    fn reparse(&mut self) {
        self.models.clear();
        for caps in MODEL_HEADER_RE.captures_iter(&self.text) {
            #[allow(clippy::expect_used)]
            let header = caps.get(0).expect("capture 0 always present");
            #[allow(clippy::expect_used)]
            let name = caps.get(1).expect("model name capture");
            let body_start = header.end();
            let Some(body_end) = scan_block_end(&self.text, body_start) else {
                // Unbalanced braces: stop at the first broken block.
                break;
            };
            self.models.push(ModelBlock {
                name: name.as_str().to_string(),
                span: header.start()..body_end + 1,
                body: body_start..body_end,
            });
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }

    #[must_use]
    pub fn model_names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }

    #[must_use]
    pub fn contains_model(&self, name: &str) -> bool {
        self.models.iter().any(|m| m.name == name)
    }

    #[must_use]
    pub fn model_body(&self, name: &str) -> Option<&str> {
        self.models
            .iter()
            .find(|m| m.name == name)
            .map(|m| &self.text[m.body.clone()])
    }

    /// Declared (non-system) fields of a model, or None when absent.
    #[must_use]
    pub fn model_fields(&self, name: &str) -> Option<Vec<SchemaField>> {
        self.model_body(name).map(extract_fields)
    }

    #[must_use]
    pub fn has_preamble(&self) -> bool {
        GENERATOR_RE.is_match(&self.text) && DATASOURCE_RE.is_match(&self.text)
    }

    /// Prepend the canonical preamble when either declaration is missing.
    pub fn ensure_preamble(&mut self) -> bool {
        if self.has_preamble() {
            return false;
        }
        let rest = self.text.trim_start();
        self.text = if rest.is_empty() {
            format!("{CANONICAL_PREAMBLE}\n")
        } else {
            format!("{CANONICAL_PREAMBLE}\n{rest}")
        };
        self.reparse();
        true
    }

    /// Merge a generated model block into the document.
    ///
    /// Same name + same normalized field set is a guaranteed no-op with
    /// byte-identical text. A changed field set replaces the block's span in
    /// place; an unknown model appends after exactly one blank line.
    pub fn merge_model(&mut self, model_text: &str) -> PanelResult<MergeOutcome> {
        self.ensure_preamble();

        let name = model_name_of(model_text).ok_or_else(|| {
            PanelError::generation("could not determine the model name from generated text")
        })?;

        let incoming_fields = extract_fields(body_of(model_text).unwrap_or(""));

        if let Some(existing) = self.models.iter().find(|m| m.name == name) {
            let existing_fields = extract_fields(&self.text[existing.body.clone()]);
            if fields_equal(&existing_fields, &incoming_fields) {
                debug!(model = %name, "model unchanged, skipping merge");
                return Ok(MergeOutcome::Unchanged);
            }
            let span = existing.span.clone();
            self.text
                .replace_range(span, model_text.trim_end_matches('\n'));
            self.reparse();
            debug!(model = %name, "model replaced in schema");
            Ok(MergeOutcome::Replaced)
        } else {
            self.text = format!(
                "{}\n\n{}\n",
                self.text.trim_end(),
                model_text.trim_end_matches('\n')
            );
            self.reparse();
            debug!(model = %name, "model appended to schema");
            Ok(MergeOutcome::Appended)
        }
    }

    /// Remove every model block whose name is not in `keep`, collapsing the
    /// leftover blank runs. Returns the removed names.
    pub fn remove_models_except(&mut self, keep: &[&str]) -> Vec<String> {
        let mut removed = Vec::new();
        let doomed: Vec<ModelBlock> = self
            .models
            .iter()
            .filter(|m| !keep.contains(&m.name.as_str()))
            .cloned()
            .collect();
        for block in doomed.iter().rev() {
            self.text.replace_range(block.span.clone(), "");
            removed.push(block.name.clone());
        }
        removed.reverse();
        if !removed.is_empty() {
            self.text = collapse_blank_runs(&self.text);
            self.reparse();
        }
        removed
    }
}

/// Name captured from a `model <Name> {` header anywhere in the text.
#[must_use]
pub fn model_name_of(model_text: &str) -> Option<String> {
    MODEL_HEADER_RE
        .captures(model_text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn body_of(model_text: &str) -> Option<&str> {
    let header = MODEL_HEADER_RE.find(model_text)?;
    let start = header.end();
    let end = scan_block_end(model_text, start)?;
    Some(&model_text[start..end])
}

/// Index of the closing brace matching an already-open block starting at
/// `from` (depth 1).
fn scan_block_end(text: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (offset, byte) in text.as_bytes().iter().enumerate().skip(from) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract declared field lines from a model body. Blank lines, `@@`
/// directives and the injected standard fields (`@id`, `@default`,
/// `createdAt`, `updatedAt`) are skipped; requiredness is the absence of a
/// `?` anywhere on the line.
#[must_use]
pub fn extract_fields(body: &str) -> Vec<SchemaField> {
    let mut fields = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("@@") {
            continue;
        }
        if trimmed.contains("@id")
            || trimmed.contains("@default")
            || trimmed.contains("createdAt")
            || trimmed.contains("updatedAt")
        {
            continue;
        }
        if let Some(caps) = FIELD_LINE_RE.captures(trimmed) {
            fields.push(SchemaField {
                name: caps[1].to_string(),
                ty: caps[2].to_string(),
                required: !trimmed.contains('?'),
            });
        }
    }
    fields
}

/// Unordered comparison keyed by field name; type and requiredness must both
/// match.
fn fields_equal(old: &[SchemaField], new: &[SchemaField]) -> bool {
    if old.len() != new.len() {
        return false;
    }
    new.iter().all(|nf| {
        old.iter()
            .any(|of| of.name == nf.name && of.ty == nf.ty && of.required == nf.required)
    })
}

/// Squash runs of 3+ newlines down to 2 and guarantee a trailing newline.
fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push('\n');
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    let mut out = out.trim_end().to_string();
    out.push('\n');
    out
}
