//! Diagnostics and their wire mapping
//!
//! Every provider operation returns [`Diagnostics`] alongside whatever
//! result it could produce. Diagnostics keep the order in which the
//! provider (or the client) raised them.

use crate::error::CallError;
use crate::proto;
use crate::proto::attribute_path::step::Selector;
use crate::types::{AttributePath, AttributePathStep};
use serde::Serialize;
use std::error::Error as _;
use std::fmt;

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// Where a diagnostic came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticOrigin {
    /// Reported by the provider plugin
    Plugin,
    /// Raised locally, e.g. by the codec or the lifecycle checks
    Client,
    /// The RPC itself failed; retrying may help
    Transport,
}

/// Diagnostic represents a warning or error about a provider operation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub summary: String,
    pub detail: String,
    #[serde(skip_serializing_if = "AttributePath::is_empty")]
    pub attribute: AttributePath,
    pub origin: DiagnosticOrigin,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: AttributePath::root(),
            origin: DiagnosticOrigin::Client,
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            ..Self::error(summary, detail)
        }
    }

    pub fn with_attribute(mut self, path: AttributePath) -> Self {
        self.attribute = path;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }

    pub fn is_transport_failure(&self) -> bool {
        self.origin == DiagnosticOrigin::Transport
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            DiagnosticSeverity::Error => "Error",
            DiagnosticSeverity::Warning => "Warning",
        };
        if self.attribute.is_empty() {
            write!(f, "{label}: {}; {}", self.summary, self.detail)
        } else {
            write!(
                f,
                "{label}: {}: {}; {}",
                self.attribute, self.summary, self.detail
            )
        }
    }
}

/// Ordered collection of diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.items.push(diag);
    }

    pub fn add_error(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.push(Diagnostic::error(summary, detail));
    }

    pub fn add_warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.push(Diagnostic::warning(summary, detail));
    }

    pub fn append(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.is_error())
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diag: Diagnostic) -> Self {
        Self { items: vec![diag] }
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diag) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{diag}")?;
        }
        Ok(())
    }
}

/// Converts diagnostics received from the plugin.
///
/// A severity the client does not recognise is treated as an error, so an
/// unclassified problem cannot be silently ignored.
pub fn decode_diagnostics(raws: &[proto::Diagnostic]) -> Diagnostics {
    raws.iter()
        .map(|raw| {
            let severity = match proto::diagnostic::Severity::try_from(raw.severity) {
                Ok(proto::diagnostic::Severity::Warning) => DiagnosticSeverity::Warning,
                Ok(proto::diagnostic::Severity::Error) => DiagnosticSeverity::Error,
                Ok(proto::diagnostic::Severity::Invalid) | Err(_) => {
                    tracing::warn!(
                        severity = raw.severity,
                        summary = %raw.summary,
                        "provider sent a diagnostic with unrecognised severity; treating it as an error"
                    );
                    DiagnosticSeverity::Error
                }
            };
            Diagnostic {
                severity,
                summary: raw.summary.clone(),
                detail: raw.detail.clone(),
                attribute: raw
                    .attribute
                    .as_ref()
                    .map(decode_attribute_path)
                    .unwrap_or_default(),
                origin: DiagnosticOrigin::Plugin,
            }
        })
        .collect()
}

/// Maps wire path steps positionally; a step without a recognised selector
/// becomes [`AttributePathStep::Unknown`] so the path keeps its length.
pub fn decode_attribute_path(raw: &proto::AttributePath) -> AttributePath {
    raw.steps
        .iter()
        .map(|step| match &step.selector {
            Some(Selector::AttributeName(name)) => AttributePathStep::AttributeName(name.clone()),
            Some(Selector::ElementKeyString(key)) => AttributePathStep::MapKey(key.clone()),
            Some(Selector::ElementKeyInt(idx)) => AttributePathStep::ListIndex(*idx),
            None => AttributePathStep::Unknown,
        })
        .collect()
}

pub fn encode_attribute_path(path: &AttributePath) -> proto::AttributePath {
    proto::AttributePath {
        steps: path
            .steps
            .iter()
            .map(|step| proto::attribute_path::Step {
                selector: match step {
                    AttributePathStep::AttributeName(name) => {
                        Some(Selector::AttributeName(name.clone()))
                    }
                    AttributePathStep::MapKey(key) => Some(Selector::ElementKeyString(key.clone())),
                    AttributePathStep::ListIndex(idx) => Some(Selector::ElementKeyInt(*idx)),
                    AttributePathStep::Unknown => None,
                },
            })
            .collect(),
    }
}

pub fn encode_diagnostics(diags: &Diagnostics) -> Vec<proto::Diagnostic> {
    diags
        .iter()
        .map(|diag| proto::Diagnostic {
            severity: match diag.severity {
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning as i32,
            },
            summary: diag.summary.clone(),
            detail: diag.detail.clone(),
            attribute: (!diag.attribute.is_empty())
                .then(|| encode_attribute_path(&diag.attribute)),
        })
        .collect()
}

/// Summarises a failed RPC call as exactly one transport diagnostic.
pub fn rpc_error_diagnostics(err: &CallError) -> Diagnostics {
    let detail = match err {
        CallError::Status(status) if status.source().is_none() => format!(
            "Provider returned RPC error {:?}: {}.",
            status.code(),
            status.message()
        ),
        CallError::Status(status) => match status.source() {
            Some(source) => format!("Provider RPC call failed: {source}."),
            None => format!("Provider RPC call failed: {}.", status.message()),
        },
        CallError::Cancelled | CallError::DeadlineExceeded => {
            format!("Provider RPC call failed: {err}.")
        }
    };
    Diagnostics::from(Diagnostic {
        origin: DiagnosticOrigin::Transport,
        ..Diagnostic::error("Failed to call provider plugin", detail)
    })
}
