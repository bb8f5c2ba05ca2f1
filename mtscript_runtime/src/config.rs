use mtscript_syntax::parse::ParseMode;

/// Per-evaluation limits and parser behaviour.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EvalConfig {
    /// Statements and expressions evaluated per `evaluate` call.
    pub max_steps: usize,
    /// Active function frames, host functions included.
    pub max_call_depth: usize,
    /// Statements and expressions under evaluation at once, summed over
    /// every active call. Bounds native stack use.
    pub max_nesting: usize,
    pub parse_mode: ParseMode,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_call_depth: 64,
            max_nesting: 512,
            parse_mode: ParseMode::Strict,
        }
    }
}

impl EvalConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = parse_mode;
        self
    }
}
