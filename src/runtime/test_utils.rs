//! Test utilities for runtime testing
//!
//! This module provides test helpers that can be used by any runtime test
//! without creating circular dependencies.

#[cfg(test)]
pub mod test {
    use crate::runtime::context::{Config, Context};
    use crate::runtime::executor::Executor;
    use crate::runtime::instruction::Instruction;
    use crate::runtime::stack::{Stack, StackItem};
    use crate::runtime::types::Type;
    use crate::runtime::{ErrorKind, RuntimeError, Value};
    use crate::text::read;

    /// Test builder for running instruction sequences fluently
    pub struct ExecutorTest {
        code: String,
        /// Input items in push order; the last one ends up on top.
        input: Vec<StackItem>,
        context: Context,
    }

    impl ExecutorTest {
        pub fn new(code: &str) -> Self {
            ExecutorTest {
                code: code.to_string(),
                input: Vec::new(),
                context: Context::new(Config {
                    trace: true,
                    ..Config::default()
                }),
            }
        }

        /// Pushes a value given as Michelson source, e.g. `.push("nat", "5")`.
        pub fn push(mut self, ty: &str, value: &str) -> Self {
            let ty = parse_type(ty);
            let value = Value::from_micheline(&read(value).expect("value should parse"), &ty)
                .expect("value should match its type");
            self.input.push(StackItem::new(value, ty));
            self
        }

        pub fn push_item(mut self, item: StackItem) -> Self {
            self.input.push(item);
            self
        }

        pub fn gas_limit(mut self, limit: u64) -> Self {
            self.context.config.gas_limit = limit;
            self.context.reset_gas();
            self
        }

        pub fn context(mut self, f: impl FnOnce(&mut Context)) -> Self {
            f(&mut self.context);
            self
        }

        /// Runs the code, returning the final stack and the trace lines.
        pub fn run(mut self) -> (Result<Stack, RuntimeError>, Vec<String>) {
            let code = Instruction::parse_seq(&read(&self.code).expect("code should parse")).expect("code should decode");
            let mut stack = Stack::new();
            for item in self.input {
                stack.push_item(item);
            }
            let mut executor = Executor::new(&mut self.context);
            let result = executor.execute(&code, &mut stack);
            let trace = executor.into_trace().into_lines();
            (result.map(|()| stack), trace)
        }

        /// Asserts the final stack, top first, as `value :: type` lines.
        pub fn expect_stack(self, expected: &[&str]) {
            let (result, _) = self.run();
            let stack = result.expect("Execution should succeed");
            let actual: Vec<String> = stack.items().map(|item| item.to_string()).collect();
            assert_eq!(actual, expected);
        }

        pub fn expect_error(self, error_contains: &str) {
            match self.run().0 {
                Err(e) => {
                    let error_string = e.to_string();
                    assert!(
                        error_string.contains(error_contains),
                        "Expected error containing '{}', got: '{}'",
                        error_contains,
                        error_string
                    );
                }
                Ok(stack) => panic!(
                    "Expected error containing '{}', but execution succeeded with {}",
                    error_contains,
                    stack.dump()
                ),
            }
        }

        pub fn expect_kind(self, kind: ErrorKind) {
            match self.run().0 {
                Err(e) => assert_eq!(e.kind(), kind, "unexpected error: {e}"),
                Ok(stack) => panic!("Expected a {kind} error, but execution succeeded with {}", stack.dump()),
            }
        }
    }

    pub fn parse_type(source: &str) -> Type {
        Type::from_micheline(&read(source).expect("type should parse")).expect("type should be valid")
    }
}
