use crate::{
    Diagnostic, DiagnosticKind, GrammarError, ImplementationError, Location, ParseError,
    Position, SourceText,
};
use std::fmt::{Display, Formatter, Write};

/// Severity threshold: diagnostics at or above this value are errors, below it warnings.
pub const MIN_ERROR_SEVERITY: i32 = 100;

impl DiagnosticKind {
    pub fn tag(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "Error",
            DiagnosticKind::Warning => "Warning",
            DiagnosticKind::UnknownMacro => "UnknownMacro",
            DiagnosticKind::DupGrammarOption => "DupGrammarOption",
            DiagnosticKind::DupToken => "DupToken",
            DiagnosticKind::DupTokenOption => "DupTokenOption",
            DiagnosticKind::UnusedTerm => "UnusedTerm",
            DiagnosticKind::UndefinedNonterm => "UndefinedNonterm",
            DiagnosticKind::UnusedNonterm => "UnusedNonterm",
            DiagnosticKind::UselessNonterm => "UselessNonterm",
            DiagnosticKind::UselessRule => "UselessRule",
            DiagnosticKind::ReadsCycle => "ReadsCycle",
            DiagnosticKind::SymbolSelfProduce => "SymbolSelfProduce",
            DiagnosticKind::LalrConflict => "LalrConflict",
            DiagnosticKind::WordOverflow => "WordOverflow",
            DiagnosticKind::CharacterRange => "CharacterRange",
            DiagnosticKind::RegexConflict => "RegexConflict",
            DiagnosticKind::DupAstItem => "DupAstItem",
            DiagnosticKind::Syntax => "Syntax",
            DiagnosticKind::Lexical => "Lexical",
            DiagnosticKind::AstIndex => "AstIndex",
        }
    }

    pub fn severity(&self) -> i32 {
        match self {
            DiagnosticKind::Warning
            | DiagnosticKind::UnusedTerm
            | DiagnosticKind::UnusedNonterm
            | DiagnosticKind::UselessRule => 0,
            _ => MIN_ERROR_SEVERITY,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity() >= MIN_ERROR_SEVERITY
    }
}

impl Diagnostic {
    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    pub fn is_error(&self) -> bool {
        self.severity >= MIN_ERROR_SEVERITY
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.location < 0 {
            write!(f, "{}: {}", self.tag(), self.short_message)
        } else {
            write!(
                f,
                "{} at {}: {}",
                self.tag(),
                Position::new(self.line, self.column),
                self.short_message
            )
        }
    }
}

/// Accumulates [Diagnostic]s raised against one source text.
///
/// The sink never aborts on its own: every generator pass keeps recording and the pipeline
/// checks [error_count](ErrorSink::error_count) between passes.
pub struct ErrorSink {
    src: SourceText,
    message_list: Vec<Diagnostic>,
}

impl ErrorSink {
    pub fn new(src: SourceText) -> Self {
        Self {
            src,
            message_list: Vec::new(),
        }
    }

    pub fn source(&self) -> &SourceText {
        &self.src
    }

    pub fn add_error(&mut self, kind: DiagnosticKind, location: Location, short_message: String) {
        self.add_error_long(kind, location, short_message, String::new());
    }

    pub fn add_error_long(
        &mut self,
        kind: DiagnosticKind,
        location: Location,
        short_message: String,
        long_message: String,
    ) {
        let (line, column, source_line) = match self.src.position_at(location) {
            Some(position) => (
                position.line,
                position.column,
                self.src.line_text(location as usize).to_string(),
            ),
            None => (0, 0, String::new()),
        };

        let long_message = if long_message.is_empty() {
            short_message.clone()
        } else {
            long_message
        };

        self.message_list.push(Diagnostic {
            kind,
            severity: kind.severity(),
            location,
            line,
            column,
            source_line,
            short_message,
            long_message,
        });
    }

    pub fn error_count(&self) -> usize {
        self.message_list.iter().filter(|m| m.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.message_list.iter().filter(|m| !m.is_error()).count()
    }

    /// All recorded messages sorted by source location, unknown locations first.
    pub fn get_error_messages(&self) -> Vec<Diagnostic> {
        let mut messages = self.message_list.clone();
        messages.sort_by_key(|m| m.location);
        messages
    }

    pub fn has_kind(&self, kind: DiagnosticKind) -> bool {
        self.message_list.iter().any(|m| m.kind == kind)
    }

    /// Render the source interleaved with caret-pointed excerpts for each located message.
    pub fn source_list(&self) -> String {
        let mut writer = String::new();
        let mut messages = self.get_error_messages();
        messages.retain(|m| m.location >= 0);
        let mut next_message = messages.into_iter().peekable();

        for (line_num, line) in self.src.text.lines().enumerate() {
            let _ = writeln!(writer, "{:>5}  {}", line_num + 1, line);

            while let Some(message) = next_message.peek() {
                if message.line != line_num + 1 {
                    break;
                }
                let _ = writeln!(
                    writer,
                    "{:>5}  {}^ {}: {}",
                    "",
                    " ".repeat(message.column.saturating_sub(1)),
                    message.tag(),
                    message.short_message
                );
                next_message.next();
            }
        }

        for message in next_message {
            let _ = writeln!(writer, "{}", message);
        }

        writer
    }
}

impl ImplementationError {
    pub fn new(what: String, message: String) -> Self {
        Self { message, what }
    }

    pub fn state_error(what: &str) -> Self {
        Self::new(
            what.to_string(),
            format!("Operation '{}' is not legal in the current parser state.", what),
        )
    }

    pub fn decode_error(message: String) -> Self {
        Self::new("decode".to_string(), message)
    }
}

impl Display for ImplementationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ImplementationError: {}-{}", self.what, self.message)
    }
}

impl GrammarError {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

impl Display for GrammarError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GrammarError: {}", self.message)
    }
}

impl ParseError {
    pub fn new(pointer: usize, message: String) -> Self {
        Self { pointer, message }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SyntaxError: {}", self.message)
    }
}
