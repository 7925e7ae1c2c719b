//! Michelson source rendering for Micheline nodes.
//!
//! `{}` renders on one line; `{:#}` breaks sequences over indented lines.
//! Either form reads back to the same tree.

use crate::micheline::Micheline;
use std::fmt::{self, Write};

impl fmt::Display for Micheline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        if f.alternate() {
            write_node(&mut out, self, Position::Application, Some(0))?;
        } else {
            write_node(&mut out, self, Position::Application, None)?;
        }
        f.write_str(&out)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Position {
    Application,
    Argument,
}

const INDENT: &str = "  ";

fn write_node(out: &mut String, node: &Micheline, pos: Position, indent: Option<usize>) -> fmt::Result {
    match node {
        Micheline::Int(value) => write!(out, "{value}"),
        Micheline::String(value) => write_string(out, value),
        Micheline::Bytes(value) => write!(out, "0x{}", hex::encode(value)),
        Micheline::Seq(items) => write_seq(out, items, indent),
        Micheline::Prim { prim, args, annots } => {
            let bare = args.is_empty() && annots.is_empty();
            let wrap = pos == Position::Argument && !bare;
            if wrap {
                out.push('(');
            }
            out.push_str(prim);
            for annot in annots {
                write!(out, " {annot}")?;
            }
            for arg in args {
                out.push(' ');
                write_node(out, arg, Position::Argument, indent)?;
            }
            if wrap {
                out.push(')');
            }
            Ok(())
        }
    }
}

fn write_seq(out: &mut String, items: &[Micheline], indent: Option<usize>) -> fmt::Result {
    if items.is_empty() {
        out.push_str("{}");
        return Ok(());
    }
    match indent {
        None => {
            out.push_str("{ ");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(" ; ");
                }
                write_node(out, item, Position::Application, None)?;
            }
            out.push_str(" }");
        }
        Some(level) => {
            out.push_str("{\n");
            for (i, item) in items.iter().enumerate() {
                out.push_str(&INDENT.repeat(level + 1));
                write_node(out, item, Position::Application, Some(level + 1))?;
                if i + 1 < items.len() {
                    out.push_str(" ;");
                }
                out.push('\n');
            }
            out.push_str(&INDENT.repeat(level));
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(out: &mut String, value: &str) -> fmt::Result {
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            c => out.push(c),
        }
    }
    out.push('"');
    Ok(())
}
