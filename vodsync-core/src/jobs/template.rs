use regex::Regex;
use thiserror::Error;

use super::{Job, JOB_KIND};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template references {{{{.{placeholder}}}}} but no such value exists")]
    MissingValue { placeholder: String },
    #[error("failed to parse job manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("manifest does not describe a {expected} (found kind {found}):\n{manifest}")]
    KindMismatch {
        expected: &'static str,
        found: String,
        manifest: String,
    },
}

/// The set of values substituted into a job manifest template. Built right
/// before rendering and discarded afterwards.
#[derive(Debug, Clone)]
pub struct TemplateValues {
    pub name: String,
    pub input_path: String,
    pub output_path: String,
    pub preset: String,
}

impl TemplateValues {
    fn get(&self, field: &str) -> Option<&str> {
        match field {
            "Name" => Some(&self.name),
            "InputPath" => Some(&self.input_path),
            "OutputPath" => Some(&self.output_path),
            "Preset" => Some(&self.preset),
            _ => None,
        }
    }
}

/// Substitutes every `{{.Field}}` placeholder in the template. A placeholder
/// without a corresponding value fails the whole render.
pub fn render(template: &str, values: &TemplateValues) -> Result<String, TemplateError> {
    let placeholder = Regex::new(r"\{\{\.([A-Za-z0-9_]+)\}\}").expect("valid regex");
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for captures in placeholder.captures_iter(template) {
        let whole = captures.get(0).unwrap();
        let field = &captures[1];
        let value = values.get(field).ok_or_else(|| TemplateError::MissingValue {
            placeholder: field.to_string(),
        })?;
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(value);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

/// Reads a job definition from rendered YAML. A manifest of the wrong kind is
/// rejected with the raw text attached, distinct from a parse failure.
pub fn deserialize(manifest: &str) -> Result<Job, TemplateError> {
    let job: Job = serde_yaml::from_str(manifest)?;
    if job.kind != JOB_KIND {
        return Err(TemplateError::KindMismatch {
            expected: JOB_KIND,
            found: job.kind,
            manifest: manifest.to_string(),
        });
    }
    Ok(job)
}

/// Builds a job definition from a template and a set of replacement values.
pub fn build_from_template(
    template: &str,
    values: &TemplateValues,
) -> Result<Job, TemplateError> {
    let manifest = render(template, values)?;
    deserialize(&manifest)
}
