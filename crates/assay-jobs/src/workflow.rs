//! Workflow parsing.
//!
//! A workflow is stored as plain text, one step identifier per line. Parsing
//! is split in two: [`parse_steps`] is the pure text transform (trim lines,
//! drop blanks, keep order), and [`Workflow::resolve`] turns the identifiers
//! into typed [`StepDescriptor`]s so an unsupported step is rejected before
//! any run state is created.

use std::fmt;
use std::path::{Component, Path};

use crate::executor::StepError;
use crate::settings::AnalysisSettings;

/// Split workflow text into step identifiers.
///
/// Lines are trimmed and blank lines dropped. Order is preserved exactly and
/// duplicates are kept.
pub fn parse_steps(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Extract the ordered step identifiers from an analysis's settings.
pub fn parse_workflow(settings: &AnalysisSettings) -> Vec<String> {
    settings
        .workflow
        .as_deref()
        .map(parse_steps)
        .unwrap_or_default()
}

/// The interpreter family a step runs under, selected by file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// `.py`
    Python,
    /// `.js`, `.cjs`
    Node,
}

impl StepKind {
    pub fn from_identifier(id: &str) -> Option<Self> {
        let ext = Path::new(id).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "py" => Some(StepKind::Python),
            "js" | "cjs" => Some(StepKind::Node),
            _ => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Python => f.write_str("python"),
            StepKind::Node => f.write_str("node"),
        }
    }
}

/// A step identifier that has been checked for a supported kind and a safe path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    id: String,
    kind: StepKind,
}

impl StepDescriptor {
    pub fn parse(id: &str) -> Result<Self, StepError> {
        let path = Path::new(id);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if id.is_empty() || escapes {
            return Err(StepError::InvalidStep(id.to_string()));
        }

        let kind =
            StepKind::from_identifier(id).ok_or_else(|| StepError::UnsupportedKind(id.to_string()))?;

        Ok(Self {
            id: id.to_string(),
            kind,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }
}

impl fmt::Display for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// An immutable, ordered list of resolved steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workflow {
    steps: Vec<StepDescriptor>,
}

impl Workflow {
    /// Parse and resolve every step of an analysis's workflow.
    ///
    /// Fails on the first step whose identifier is unsafe or has an
    /// unsupported suffix.
    pub fn resolve(settings: &AnalysisSettings) -> Result<Self, StepError> {
        let steps = parse_workflow(settings)
            .iter()
            .map(|id| StepDescriptor::parse(id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
