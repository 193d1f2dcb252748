// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all compiler phases,
// and the sink they accumulate in. Passes never abort on a user-facing
// problem; they report here and keep walking so one run surfaces every
// issue. The pipeline refuses to hand the program to code generation
// once any error has been recorded.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Coord;

// ── Diagnostic code ──

/// A stable diagnostic code (e.g., `E0101`, `W0201`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable diagnostic codes emitted by the resolver passes.
pub mod codes {
    use super::DiagCode;

    /// Program requires more cores than the target provides.
    pub const INSUFFICIENT_CORES: DiagCode = DiagCode("E0101");
    /// Parallel composition mixes explicit and synthetic placement.
    pub const MIXED_PLACEMENT: DiagCode = DiagCode("E0102");
    /// Placement target expression does not fold to a constant.
    pub const UNFOLDABLE_TARGET: DiagCode = DiagCode("E0103");

    /// Declared channel never used.
    pub const CHAN_UNUSED: DiagCode = DiagCode("W0201");
    /// Channel used at one location only.
    pub const CHAN_NO_SLAVE: DiagCode = DiagCode("E0202");
    /// Channel used at more than two locations.
    pub const CHAN_MULTIPLE_SLAVES: DiagCode = DiagCode("E0203");
    /// Channel subscript or offset does not fold during expansion.
    pub const CHAN_UNFOLDABLE: DiagCode = DiagCode("E0204");

    /// Replicator body is not a single process call.
    pub const REP_NOT_CALL: DiagCode = DiagCode("E0301");
    /// Replicator bound is missing, non-constant, or not positive.
    pub const REP_UNBOUNDED: DiagCode = DiagCode("E0302");
    /// Materialized process exceeds the parameter limit.
    pub const TOO_MANY_PARAMS: DiagCode = DiagCode("E0303");
}

// ── Severity level ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related coordinate ──

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedCoord {
    pub coord: Coord,
    pub label: String,
}

// ── Diagnostic ──

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub coord: Coord,
    pub message: String,
    pub hint: Option<String>,
    pub related: Vec<RelatedCoord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related locations.
    pub fn new(level: DiagLevel, coord: Coord, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            coord,
            message: message.into(),
            hint: None,
            related: Vec::new(),
        }
    }

    pub fn error(coord: Coord, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, coord, message)
    }

    pub fn warning(coord: Coord, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, coord, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related location.
    pub fn with_related(mut self, coord: Coord, label: impl Into<String>) -> Self {
        self.related.push(RelatedCoord {
            coord,
            label: label.into(),
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if !self.coord.is_none() {
            write!(f, " at {}", self.coord)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

// ── Sink ──

/// Accumulator for diagnostics across a compilation.
///
/// A pass that detects a user-facing problem reports it here and
/// continues; only the pipeline inspects `has_errors` between passes.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn report(&mut self, diag: Diagnostic) {
        tracing::debug!(level = ?diag.level, code = ?diag.code, "{}", diag.message);
        self.items.push(diag);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.level == DiagLevel::Error)
    }

    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.level == DiagLevel::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.level == DiagLevel::Warning)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
