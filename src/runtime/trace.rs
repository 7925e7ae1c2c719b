//! Per-instruction trace log.

use super::stack::StackItem;
use tracing::trace;

/// Collected `PRIM: [operands] -> [results]` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    enabled: bool,
    lines: Vec<String>,
}

fn render(items: &[&StackItem]) -> String {
    let values: Vec<String> = items.iter().map(|item| item.value.to_string()).collect();
    format!("[{}]", values.join(", "))
}

impl Trace {
    pub fn new(enabled: bool) -> Self {
        Trace {
            enabled,
            lines: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, prim: &str, operands: &[&StackItem], results: &[&StackItem]) {
        let line = format!("{prim}: {} -> {}", render(operands), render(results));
        trace!(target: "michelson::trace", "{line}");
        if self.enabled {
            self.lines.push(line);
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}
