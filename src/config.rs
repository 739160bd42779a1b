//! Engine configuration and resource caps.

pub const DEFAULT_MAX_RESULT_ROWS: usize = 10_000;
pub const DEFAULT_MAX_EXPAND_DEPTH: usize = 15;
pub const DEFAULT_MAX_PARSER_DEPTH: usize = 64;

/// Per-graph configuration. Exceeding any cap surfaces as a RUNTIME error.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Maximum rows a query may emit without a LIMIT clause.
    pub max_result_rows: usize,
    /// Maximum hop count for variable-length expansion.
    pub max_expand_depth: usize,
    /// Maximum recursion depth in the parser.
    pub max_parser_depth: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
            max_expand_depth: DEFAULT_MAX_EXPAND_DEPTH,
            max_parser_depth: DEFAULT_MAX_PARSER_DEPTH,
        }
    }
}
