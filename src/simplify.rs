//! Simple-view support: signature normalization and eligibility.

use std::collections::HashSet;

use regex::Regex;

use crate::config::SimpleConfig;
use crate::error::{OpFinderError, Result};
use crate::registry::{InputSpec, RegistrySource};

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| OpFinderError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Rewrites formal signatures into the short form shown in the simple view:
/// `Img out = gauss(Img in, double sigma, long[] border?)` becomes
/// `gauss(Image in, Number sigma)`.
#[derive(Debug, Clone)]
pub struct SignatureSimplifier {
    type_rules: Vec<(Regex, String)>,
    optional_param: Regex,
    repeated_separator: Regex,
    trailing_separator: Regex,
    leading_separator: Regex,
}

impl SignatureSimplifier {
    pub fn from_config(config: &SimpleConfig) -> Result<Self> {
        let mut type_rules = Vec::new();
        for (pattern, label) in [
            (&config.image_pattern, &config.image_label),
            (&config.number_pattern, &config.number_label),
        ] {
            if pattern.trim().is_empty() {
                continue;
            }
            type_rules.push((compile(&format!(r"\b(?:{})\b", pattern))?, label.clone()));
        }

        Ok(Self {
            type_rules,
            optional_param: compile(r"[a-zA-Z0-9]+(\[\])? [a-zA-Z0-9]+\?")?,
            repeated_separator: compile(r", (, )+")?,
            trailing_separator: compile(r"(, )+(\))")?,
            leading_separator: compile(r"(\()(, )+")?,
        })
    }

    pub fn simplify(&self, signature: &str) -> String {
        let mut text = signature.to_string();

        for (pattern, label) in &self.type_rules {
            text = pattern.replace_all(&text, label.as_str()).into_owned();
        }

        text = self.optional_param.replace_all(&text, "").into_owned();
        text = self.repeated_separator.replace_all(&text, ", ").into_owned();
        text = self.trailing_separator.replace_all(&text, "${2}").into_owned();
        text = self.leading_separator.replace_all(&text, "${1}").into_owned();

        strip_return_variable(&text).to_string()
    }
}

// "Image out = gauss(Image in)" -> "gauss(Image in)"
fn strip_return_variable(text: &str) -> &str {
    let Some(open) = text.find('(') else {
        return text;
    };
    match text[..open].rfind(' ') {
        Some(space) => &text[space + 1..],
        None => text,
    }
}

/// Decides which entries appear in the simple view.
///
/// An entry qualifies when one of its inputs is assignable to an eligible
/// type and no entry with the same simplified signature was admitted before.
#[derive(Debug, Clone, Default)]
pub struct SimpleEligibility {
    eligible_types: Vec<String>,
    admitted: HashSet<String>,
}

impl SimpleEligibility {
    pub fn new(eligible_types: Vec<String>) -> Self {
        Self {
            eligible_types,
            admitted: HashSet::new(),
        }
    }

    pub fn admit(&mut self, simple_name: &str, inputs: &[InputSpec], source: &dyn RegistrySource) -> bool {
        if self.admitted.contains(simple_name) {
            return false;
        }

        let eligible = inputs.iter().any(|input| {
            self.eligible_types
                .iter()
                .any(|accepted| source.is_assignable(accepted, &input.type_name))
        });

        if eligible {
            self.admitted.insert(simple_name.to_string());
        }
        eligible
    }

    pub fn admitted_count(&self) -> usize {
        self.admitted.len()
    }
}
