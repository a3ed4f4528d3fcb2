use once_cell::sync::Lazy;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

use crate::def::DefId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

#[derive(Clone)]
pub struct Diagnostic<T = String>
where
    T: Clone + Display,
{
    pub level: DiagnosticLevel,
    pub message: T,
    /// Definition the diagnostic is about, when there is one.
    pub definition: Option<DefId>,
    pub suggestions: Vec<String>,
    pub source_context: Option<String>,
    pub code: Option<String>,
}

impl<T> Diagnostic<T>
where
    T: Clone + Display,
{
    fn with_level(level: DiagnosticLevel, message: T) -> Self {
        Self {
            level,
            message,
            definition: None,
            suggestions: Vec::new(),
            source_context: None,
            code: None,
        }
    }

    pub fn error(message: T) -> Self {
        Self::with_level(DiagnosticLevel::Error, message)
    }

    pub fn warning(message: T) -> Self {
        Self::with_level(DiagnosticLevel::Warning, message)
    }

    pub fn info(message: T) -> Self {
        Self::with_level(DiagnosticLevel::Info, message)
    }

    pub fn with_definition(mut self, definition: DefId) -> Self {
        self.definition = Some(definition);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_source_context(mut self, context: impl Into<String>) -> Self {
        self.source_context = Some(context.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }

    pub fn as_string_diagnostic(&self) -> Diagnostic<String> {
        Diagnostic {
            level: self.level,
            message: self.message.to_string(),
            definition: self.definition,
            suggestions: self.suggestions.clone(),
            source_context: self.source_context.clone(),
            code: self.code.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Diagnostic<T>
where
    T: Clone + Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostic")
            .field("level", &self.level)
            .field("message", &self.message.to_string())
            .field("definition", &self.definition)
            .field("suggestions", &self.suggestions)
            .field("source_context", &self.source_context)
            .field("code", &self.code)
            .finish()
    }
}

impl<T> Display for Diagnostic<T>
where
    T: Clone + Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }

        if !self.suggestions.is_empty() {
            let hints = self.suggestions.join("; ");
            write!(f, " (hints: {})", hints)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticManager {
    diagnostics: Arc<Mutex<Vec<Diagnostic>>>,
}

impl Default for DiagnosticManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticManager {
    pub fn new() -> Self {
        Self {
            diagnostics: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_diagnostic(&self, diagnostic: Diagnostic) {
        match self.diagnostics.lock() {
            Ok(mut diagnostics) => diagnostics.push(diagnostic),
            Err(poison) => poison.into_inner().push(diagnostic),
        }
    }

    pub fn add_diagnostics(&self, new_diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in new_diagnostics {
            self.add_diagnostic(diagnostic);
        }
    }

    pub fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .map(|d| d.clone())
            .unwrap_or_else(|poison| poison.into_inner().clone())
    }

    pub fn has_errors(&self) -> bool {
        self.get_diagnostics().iter().any(Diagnostic::is_error)
    }

    pub fn clear(&self) {
        match self.diagnostics.lock() {
            Ok(mut diagnostics) => diagnostics.clear(),
            Err(poison) => poison.into_inner().clear(),
        }
    }

    /// Render every collected diagnostic as plain lines.
    pub fn render(&self, fallback_context: &str) -> Vec<String> {
        self.get_diagnostics()
            .iter()
            .flat_map(|diagnostic| render_plain(diagnostic, fallback_context))
            .collect()
    }
}

static GLOBAL_DIAGNOSTIC_MANAGER: Lazy<Arc<DiagnosticManager>> =
    Lazy::new(|| Arc::new(DiagnosticManager::new()));

pub fn diagnostic_manager() -> Arc<DiagnosticManager> {
    GLOBAL_DIAGNOSTIC_MANAGER.clone()
}

pub fn report_error(message: impl Into<String>) -> crate::error::Error {
    let diagnostic = Diagnostic::error(message.into());
    tracing::error!("[diagnostic] {}", diagnostic.message);
    diagnostic_manager().add_diagnostic(diagnostic.clone());
    crate::error::Error::diagnostic(diagnostic)
}

pub fn render_plain<M>(diagnostic: &Diagnostic<M>, fallback_context: &str) -> Vec<String>
where
    M: Clone + Display,
{
    let level = match diagnostic.level {
        DiagnosticLevel::Error => "ERROR",
        DiagnosticLevel::Warning => "WARNING",
        DiagnosticLevel::Info => "INFO",
    };
    let context = diagnostic
        .source_context
        .as_deref()
        .unwrap_or(fallback_context);

    let header = match diagnostic.code.as_ref() {
        Some(code) => format!("[{}] {}: {} ({})", context, level, diagnostic.message, code),
        None => format!("[{}] {}: {}", context, level, diagnostic.message),
    };

    let mut lines = vec![header];

    if let Some(definition) = &diagnostic.definition {
        lines.push(format!("   in definition {}", definition));
    }

    for suggestion in &diagnostic.suggestions {
        lines.push(format!("   suggestion: {}", suggestion));
    }

    lines
}
