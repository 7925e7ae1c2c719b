//! Common test utilities shared between integration tests
#![allow(dead_code)]

use michelson::runtime::{Context, ExecutionResult, RuntimeError, Script, Type, Value};
use michelson::text::read;
use std::fs;

pub fn script(source: &str) -> Script {
    Script::from_text(source).unwrap_or_else(|e| panic!("script should load: {e}"))
}

pub fn load_script(path: &str) -> Script {
    let source = fs::read_to_string(path).unwrap_or_else(|e| panic!("cannot read {path}: {e}"));
    script(&source)
}

pub fn ty(source: &str) -> Type {
    Type::from_micheline(&read(source).expect("type should parse")).expect("type should be valid")
}

/// Decodes a value written in Michelson syntax against `ty`.
pub fn value(ty: &Type, source: &str) -> Value {
    Value::from_micheline(&read(source).expect("value should parse"), ty)
        .unwrap_or_else(|e| panic!("{source} is not a valid {ty}: {e}"))
}

pub fn run(
    script: &Script,
    entrypoint: Option<&str>,
    parameter: &str,
    storage: &str,
    ctx: &mut Context,
) -> Result<ExecutionResult, RuntimeError> {
    let parameter = read(parameter).expect("parameter should parse");
    let storage = read(storage).expect("storage should parse");
    script.run(entrypoint, &parameter, &storage, ctx)
}
