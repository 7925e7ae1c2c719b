//! Macro expansion.
//!
//! Macros are sugar primitives that expand syntactically into sequences of
//! real instructions. Expansion never looks at types, so a macro and its
//! expansion have the same stack effect by construction. Names that are real
//! primitives (`PAIR`, `CAR`, `DUP`, ...) are never treated as macros.

use super::primitives;
use super::Micheline;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacroError {
    #[error("macro {name} expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("malformed macro {0}")]
    Malformed(String),
}

static COMPARISON: &[&str] = &["EQ", "NEQ", "LT", "GT", "LE", "GE"];

static PAIR_TREE: Lazy<Regex> = Lazy::new(|| re(r"^P[AIP]+R$"));
static UNPAIR_TREE: Lazy<Regex> = Lazy::new(|| re(r"^UNP[AIP]+R$"));
static CADR: Lazy<Regex> = Lazy::new(|| re(r"^C[AD]+R$"));
static SET_CADR: Lazy<Regex> = Lazy::new(|| re(r"^SET_C[AD]+R$"));
static MAP_CADR: Lazy<Regex> = Lazy::new(|| re(r"^MAP_C[AD]+R$"));
static DIIP: Lazy<Regex> = Lazy::new(|| re(r"^DI(I+)P$"));
static DUUP: Lazy<Regex> = Lazy::new(|| re(r"^DU(U+)P$"));

fn re(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => panic!("invalid macro pattern {pattern}: {e}"),
    }
}

fn op(name: &str) -> Micheline {
    Micheline::keyword(name)
}

fn op_with(name: &str, args: Vec<Micheline>) -> Micheline {
    Micheline::prim(name, args)
}

fn fail() -> Micheline {
    Micheline::seq(vec![op("UNIT"), op("FAILWITH")])
}

fn empty() -> Micheline {
    Micheline::seq(vec![])
}

fn dip(body: Vec<Micheline>) -> Micheline {
    op_with("DIP", vec![Micheline::seq(body)])
}

fn check_arity(name: &str, args: &[Micheline], expected: usize) -> Result<(), MacroError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(MacroError::Arity {
            name: name.to_string(),
            expected,
            found: args.len(),
        })
    }
}

/// Returns true if `name` is a macro rather than a real primitive.
pub fn is_macro(name: &str) -> bool {
    primitives::code_of(name).is_none() && expand_prim(name, &[]).map_or(true, |r| r.is_some())
}

/// Expands `node` if it is a macro application, returning the replacement
/// sequence. Returns `Ok(None)` for anything that is not a macro.
pub fn expand(node: &Micheline) -> Result<Option<Micheline>, MacroError> {
    match node {
        Micheline::Prim { prim, args, .. } if primitives::code_of(prim).is_none() => {
            Ok(expand_prim(prim, args)?.map(Micheline::Seq))
        }
        _ => Ok(None),
    }
}

/// Expands every macro in a code tree, recursively, until none remain.
pub fn expand_all(node: &Micheline) -> Result<Micheline, MacroError> {
    match node {
        Micheline::Seq(items) => Ok(Micheline::Seq(
            items.iter().map(expand_all).collect::<Result<_, _>>()?,
        )),
        Micheline::Prim { prim, args, annots } => {
            if let Some(expanded) = expand(node)? {
                return expand_all(&expanded);
            }
            Ok(Micheline::Prim {
                prim: prim.clone(),
                args: args.iter().map(expand_all).collect::<Result<_, _>>()?,
                annots: annots.clone(),
            })
        }
        other => Ok(other.clone()),
    }
}

fn expand_prim(name: &str, args: &[Micheline]) -> Result<Option<Vec<Micheline>>, MacroError> {
    if let Some(cmp) = name.strip_prefix("CMP").filter(|c| COMPARISON.contains(c)) {
        check_arity(name, args, 0)?;
        return Ok(Some(vec![op("COMPARE"), op(cmp)]));
    }
    if let Some(cmp) = name.strip_prefix("IFCMP").filter(|c| COMPARISON.contains(c)) {
        check_arity(name, args, 2)?;
        return Ok(Some(vec![op("COMPARE"), op(cmp), op_with("IF", args.to_vec())]));
    }
    if let Some(cmp) = name.strip_prefix("IF").filter(|c| COMPARISON.contains(c)) {
        check_arity(name, args, 2)?;
        return Ok(Some(vec![op(cmp), op_with("IF", args.to_vec())]));
    }
    if let Some(cmp) = name.strip_prefix("ASSERT_CMP").filter(|c| COMPARISON.contains(c)) {
        check_arity(name, args, 0)?;
        return Ok(Some(vec![
            op("COMPARE"),
            op(cmp),
            op_with("IF", vec![empty(), fail()]),
        ]));
    }
    if let Some(cmp) = name.strip_prefix("ASSERT_").filter(|c| COMPARISON.contains(c)) {
        check_arity(name, args, 0)?;
        return Ok(Some(vec![op(cmp), op_with("IF", vec![empty(), fail()])]));
    }

    let fixed = match name {
        "FAIL" => Some((0, vec![op("UNIT"), op("FAILWITH")])),
        "ASSERT" => Some((0, vec![op_with("IF", vec![empty(), fail()])])),
        "ASSERT_NONE" => Some((0, vec![op_with("IF_NONE", vec![empty(), fail()])])),
        "ASSERT_SOME" => Some((0, vec![op_with("IF_NONE", vec![fail(), empty()])])),
        "ASSERT_LEFT" => Some((0, vec![op_with("IF_LEFT", vec![empty(), fail()])])),
        "ASSERT_RIGHT" => Some((0, vec![op_with("IF_LEFT", vec![fail(), empty()])])),
        "IF_SOME" | "IF_RIGHT" => {
            let target = if name == "IF_SOME" { "IF_NONE" } else { "IF_LEFT" };
            let swapped = args.iter().rev().cloned().collect();
            Some((2, vec![op_with(target, swapped)]))
        }
        _ => None,
    };
    if let Some((arity, code)) = fixed {
        check_arity(name, args, arity)?;
        return Ok(Some(code));
    }

    if let Some(caps) = DIIP.captures(name) {
        check_arity(name, args, 1)?;
        let depth = caps[1].len() + 1;
        return Ok(Some(vec![op_with(
            "DIP",
            vec![Micheline::int(depth), args[0].clone()],
        )]));
    }
    if let Some(caps) = DUUP.captures(name) {
        check_arity(name, args, 0)?;
        let depth = caps[1].len() + 1;
        return Ok(Some(vec![op_with("DUP", vec![Micheline::int(depth)])]));
    }
    if CADR.is_match(name) {
        check_arity(name, args, 0)?;
        return Ok(Some(car_cdr_chain(&name[1..name.len() - 1])));
    }
    if let Some(path) = name.strip_prefix("SET_C").filter(|_| SET_CADR.is_match(name)) {
        check_arity(name, args, 0)?;
        return Ok(Some(set_path(&path[..path.len() - 1])));
    }
    if let Some(path) = name.strip_prefix("MAP_C").filter(|_| MAP_CADR.is_match(name)) {
        check_arity(name, args, 1)?;
        return Ok(Some(map_path(&path[..path.len() - 1], &args[0])));
    }
    if UNPAIR_TREE.is_match(name) {
        check_arity(name, args, 0)?;
        let tree = parse_pair_tree(&name[2..]).ok_or_else(|| MacroError::Malformed(name.to_string()))?;
        return Ok(Some(unpair_code(&tree)));
    }
    if PAIR_TREE.is_match(name) {
        check_arity(name, args, 0)?;
        let tree = parse_pair_tree(name).ok_or_else(|| MacroError::Malformed(name.to_string()))?;
        return Ok(Some(pair_code(&tree)));
    }
    Ok(None)
}

fn car_cdr_chain(path: &str) -> Vec<Micheline> {
    path.chars()
        .map(|c| op(if c == 'A' { "CAR" } else { "CDR" }))
        .collect()
}

/// `path` is the `[AD]+` part of `SET_C[AD]+R`.
fn set_path(path: &str) -> Vec<Micheline> {
    let (head, rest) = path.split_at(1);
    match (head, rest.is_empty()) {
        ("A", true) => vec![op("CDR"), op("SWAP"), op("PAIR")],
        (_, true) => vec![op("CAR"), op("PAIR")],
        ("A", false) => {
            let mut inner = vec![op("CAR")];
            inner.extend(set_path(rest));
            vec![op("DUP"), dip(inner), op("CDR"), op("SWAP"), op("PAIR")]
        }
        (_, false) => {
            let mut inner = vec![op("CDR")];
            inner.extend(set_path(rest));
            vec![op("DUP"), dip(inner), op("CAR"), op("PAIR")]
        }
    }
}

fn map_path(path: &str, code: &Micheline) -> Vec<Micheline> {
    let (head, rest) = path.split_at(1);
    match (head, rest.is_empty()) {
        ("A", true) => vec![
            op("DUP"),
            op("CDR"),
            dip(vec![op("CAR"), code.clone()]),
            op("SWAP"),
            op("PAIR"),
        ],
        (_, true) => vec![
            op("DUP"),
            op("CDR"),
            code.clone(),
            op("SWAP"),
            op("CAR"),
            op("PAIR"),
        ],
        ("A", false) => {
            let mut inner = vec![op("CAR")];
            inner.extend(map_path(rest, code));
            vec![op("DUP"), dip(inner), op("CDR"), op("SWAP"), op("PAIR")]
        }
        (_, false) => {
            let mut inner = vec![op("CDR")];
            inner.extend(map_path(rest, code));
            vec![op("DUP"), dip(inner), op("CAR"), op("PAIR")]
        }
    }
}

/// Shape of a `P[AIP]+R` name: each node has a left and right side that is
/// either a leaf or another pair.
#[derive(Debug, PartialEq)]
enum PairTree {
    Leaf,
    Node(Box<PairTree>, Box<PairTree>),
}

fn parse_pair_tree(name: &str) -> Option<PairTree> {
    let letters: Vec<char> = name.chars().collect();
    let mut pos = 0;
    let tree = parse_pair_node(&letters, &mut pos)?;
    (letters.get(pos) == Some(&'R') && pos + 1 == letters.len()).then_some(tree)
}

fn parse_pair_node(letters: &[char], pos: &mut usize) -> Option<PairTree> {
    if letters.get(*pos) != Some(&'P') {
        return None;
    }
    *pos += 1;
    let left = match letters.get(*pos)? {
        'A' => {
            *pos += 1;
            PairTree::Leaf
        }
        'P' => parse_pair_node(letters, pos)?,
        _ => return None,
    };
    let right = match letters.get(*pos)? {
        'I' => {
            *pos += 1;
            PairTree::Leaf
        }
        'P' => parse_pair_node(letters, pos)?,
        _ => return None,
    };
    Some(PairTree::Node(Box::new(left), Box::new(right)))
}

fn pair_code(tree: &PairTree) -> Vec<Micheline> {
    let PairTree::Node(left, right) = tree else {
        return Vec::new();
    };
    let mut code = pair_code(left);
    if matches!(**right, PairTree::Node(..)) {
        code.push(dip(pair_code(right)));
    }
    code.push(op("PAIR"));
    code
}

fn unpair_code(tree: &PairTree) -> Vec<Micheline> {
    let PairTree::Node(left, right) = tree else {
        return Vec::new();
    };
    let mut code = vec![op("UNPAIR")];
    if matches!(**right, PairTree::Node(..)) {
        code.push(dip(unpair_code(right)));
    }
    code.extend(unpair_code(left));
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::read;

    fn expanded(source: &str) -> String {
        let node = read(source).unwrap();
        expand(&node).unwrap().unwrap().to_string()
    }

    #[test]
    fn comparison_macros() {
        assert_eq!(expanded("CMPLT"), "{ COMPARE ; LT }");
        assert_eq!(expanded("IFEQ { UNIT } {}"), "{ EQ ; IF { UNIT } {} }");
        assert_eq!(expanded("IFCMPGE {} { DROP }"), "{ COMPARE ; GE ; IF {} { DROP } }");
        assert_eq!(
            expanded("ASSERT_CMPNEQ"),
            "{ COMPARE ; NEQ ; IF {} { UNIT ; FAILWITH } }"
        );
    }

    #[test]
    fn assertion_and_branch_macros() {
        assert_eq!(expanded("FAIL"), "{ UNIT ; FAILWITH }");
        assert_eq!(expanded("ASSERT_SOME"), "{ IF_NONE { UNIT ; FAILWITH } {} }");
        assert_eq!(expanded("IF_SOME { A } { B }"), "{ IF_NONE { B } { A } }");
        assert_eq!(expanded("IF_RIGHT { A } { B }"), "{ IF_LEFT { B } { A } }");
    }

    #[test]
    fn dip_dup_and_cadr() {
        assert_eq!(expanded("DIIIP { DROP }"), "{ DIP 3 { DROP } }");
        assert_eq!(expanded("DUUP"), "{ DUP 2 }");
        assert_eq!(expanded("CADDR"), "{ CAR ; CDR ; CDR }");
    }

    #[test]
    fn pair_trees() {
        assert_eq!(expanded("PAPPAIIR"), "{ DIP { PAIR ; PAIR } ; PAIR }");
        assert_eq!(expanded("PPAIPAIR"), "{ PAIR ; DIP { PAIR } ; PAIR }");
        assert_eq!(expanded("UNPAPAIR"), "{ UNPAIR ; DIP { UNPAIR } }");
        assert!(expand(&read("PAPR").unwrap()).is_err());
    }

    #[test]
    fn set_and_map_paths() {
        assert_eq!(expanded("SET_CAR"), "{ CDR ; SWAP ; PAIR }");
        assert_eq!(expanded("SET_CDR"), "{ CAR ; PAIR }");
        assert_eq!(
            expanded("SET_CADR"),
            "{ DUP ; DIP { CAR ; CAR ; PAIR } ; CDR ; SWAP ; PAIR }"
        );
        assert_eq!(
            expanded("MAP_CDR { INT }"),
            "{ DUP ; CDR ; { INT } ; SWAP ; CAR ; PAIR }"
        );
    }

    #[test]
    fn real_primitives_are_not_macros() {
        for name in ["PAIR", "CAR", "DUP", "DIP", "UNPAIR", "IF"] {
            assert!(!is_macro(name), "{name}");
        }
        assert!(is_macro("CDAR"));
        assert!(!is_macro("FOO"));
        assert_eq!(expand(&Micheline::keyword("CAR")).unwrap(), None);
    }

    #[test]
    fn arity_is_checked() {
        let err = expand(&read("IFEQ {}").unwrap()).unwrap_err();
        assert_eq!(
            err,
            MacroError::Arity {
                name: "IFEQ".into(),
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn expand_all_reaches_nested_code() {
        let node = read("{ IF { CMPEQ } { DIIP { FAIL } } }").unwrap();
        assert_eq!(
            expand_all(&node).unwrap().to_string(),
            "{ IF { { COMPARE ; EQ } } { { DIP 2 { { UNIT ; FAILWITH } } } } }"
        );
    }
}
