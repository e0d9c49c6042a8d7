use std::fmt::{Display, Formatter};

/// Logging detail for a parser facade. `Stages` announces each generation stage, `Detail`
/// adds per-stage measurements on top. The payload labels the facade in the output so
/// several parsers can log side by side.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Log<T> {
    Quiet,
    Stages(T),
    Detail(T),
}

impl<T> Log<T> {
    pub fn label(&self) -> Option<&T> {
        match self {
            Log::Quiet => None,
            Log::Stages(label) | Log::Detail(label) => Some(label),
        }
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self, Log::Quiet)
    }
}

impl<T: Display> Log<T> {
    /// Announce a generation stage. Printed at `Stages` and above.
    pub fn log_progress(&self, _stage: &str) {
        #[cfg(debug_assertions)]
        if let Some(label) = self.label() {
            println!("({}) {}", label, _stage);
        }
    }

    /// Report a measurement worth seeing only when tracing closely. Printed at `Detail`.
    pub fn log_verbose(&self, _detail: &str) {
        #[cfg(debug_assertions)]
        if let Log::Detail(label) = self {
            println!("({}) .. {}", label, _detail);
        }
    }
}

impl<T: Display> Display for Log<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.label() {
            Some(label) => write!(f, "{}", label),
            None => f.write_str("(quiet)"),
        }
    }
}
