//! Whole-contract scenarios: multi-run state, macros, gas, traces and
//! emitted operations.

mod common;

#[cfg(test)]
mod tests {
    use crate::common;
    use michelson::micheline::Micheline;
    use michelson::runtime::{
        BigMapStore, ChainEnv, Config, Context, ErrorKind, Operation, RuntimeError, Script, Value,
    };
    use num_bigint::BigInt;

    const BIDDER: &str = "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb";

    fn paying(amount: u64) -> Context {
        Context::default().with_env(ChainEnv {
            amount,
            ..ChainEnv::default()
        })
    }

    fn storage(script: &Script, source: &str) -> Value {
        common::value(&script.storage, source)
    }

    // =======================================================================
    // Multi-run scenario
    // =======================================================================

    #[test]
    fn auction_bidding() {
        let script = common::load_script("tests/fixtures/contracts/auction.tz");

        let first = common::run(&script, Some("bid"), "Unit", "Pair None (Pair 0 False)", &mut paying(100)).unwrap();
        assert!(first.operations.is_empty());
        let leading = format!("Pair (Some \"{BIDDER}\") (Pair 100 False)");
        assert_eq!(first.storage, storage(&script, &leading));

        let low = common::run(&script, Some("bid"), "Unit", &leading, &mut paying(50)).unwrap_err();
        assert_eq!(low.root_cause(), &RuntimeError::FailWith(Micheline::string("bid too low")));

        let outbid = common::run(&script, Some("bid"), "Unit", &leading, &mut paying(200)).unwrap();
        let [Operation::Transfer {
            destination, amount, ..
        }] = outbid.operations.as_slice()
        else {
            panic!("expected one refund, got {:?}", outbid.operations);
        };
        assert_eq!(destination.to_string(), BIDDER);
        assert_eq!(*amount, 100);

        let closed = common::run(&script, Some("close"), "Unit", &leading, &mut paying(0)).unwrap();
        let closed_storage = format!("Pair (Some \"{BIDDER}\") (Pair 100 True)");
        assert_eq!(closed.storage, storage(&script, &closed_storage));

        let late = common::run(&script, Some("bid"), "Unit", &closed_storage, &mut paying(500)).unwrap_err();
        assert_eq!(late.kind(), ErrorKind::Failed);
        assert_eq!(late.root_cause(), &RuntimeError::FailWith(Micheline::string("closed")));
    }

    // =======================================================================
    // Macros
    // =======================================================================

    #[test]
    fn macros_behave_like_their_expansion() {
        let sugared = common::script(
            "parameter (pair int (pair int int)) ; storage int ;
             code { CAR ; DUP ; UNPAPAIR ; DIIP { DROP } ; ADD ; SWAP ; CDAR ; DUUP ; CMPLT ;
                    IF { NEG } {} ; NIL operation ; PAIR }",
        );
        let expanded = common::script(
            "parameter (pair int (pair int int)) ; storage int ;
             code { CAR ; DUP ; UNPAIR ; DIP { UNPAIR } ; DIP 2 { DROP } ; ADD ; SWAP ; CDR ; CAR ;
                    DUP 2 ; COMPARE ; LT ; IF { NEG } {} ; NIL operation ; PAIR }",
        );

        for parameter in ["Pair 1 (Pair 2 3)", "Pair 5 (Pair 4 0)", "Pair -2 (Pair -7 9)"] {
            let a = common::run(&sugared, None, parameter, "0", &mut Context::default()).unwrap();
            let b = common::run(&expanded, None, parameter, "0", &mut Context::default()).unwrap();
            assert_eq!(a.storage, b.storage, "{parameter}");
            assert_eq!(a.consumed_gas, b.consumed_gas, "{parameter}");
        }
    }

    // =======================================================================
    // Gas, configuration and tracing
    // =======================================================================

    #[test]
    fn exhausted_run_leaves_nothing_behind() {
        let script = common::script(
            "parameter nat ; storage (big_map nat nat) ;
             code { UNPAIR ; DIP { PUSH (option nat) (Some 1) } ; UPDATE ;
                    NIL operation ; SENDER ; CONTRACT unit ; ASSERT_SOME ;
                    PUSH mutez 1 ; UNIT ; TRANSFER_TOKENS ; CONS ;
                    PUSH bool True ; LOOP { PUSH bool True } ; PAIR }",
        );
        let mut ctx = Context::new(Config {
            gas_limit: 100,
            ..Config::default()
        });
        let err = common::run(&script, None, "1", "{}", &mut ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert!(ctx.emitted().is_empty());
        assert!(ctx.store().fetch(&BigInt::from(0)).is_none());
        assert_eq!(ctx.consumed_gas(), 100);
    }

    #[test]
    fn config_sets_costs_and_trace() {
        let config = Config::from_json(
            r#"{ "gas_limit": 1000, "schedule": { "default_cost": 2, "overrides": { "ADD": 10 } }, "trace": true }"#,
        )
        .unwrap();
        assert_eq!(config.schedule.loop_iteration, 1);

        let script = common::load_script("tests/fixtures/contracts/counter.tz");
        let mut ctx = Context::new(config);
        let result = common::run(&script, Some("increment"), "5", "10", &mut ctx).unwrap();
        assert_eq!(result.storage, Value::int(15));
        assert_eq!(result.consumed_gas, 2 + 2 + 10 + 2 + 2);
        assert_eq!(
            result.trace,
            [
                "UNPAIR: [Pair (Left 5) 10] -> [Left 5, 10]",
                "IF_LEFT: [Left 5] -> []",
                "ADD: [5, 10] -> [15]",
                "NIL: [] -> [{}]",
                "PAIR: [{}, 15] -> [Pair {} 15]",
            ]
        );
    }

    #[test]
    fn trace_is_empty_unless_enabled() {
        let script = common::load_script("tests/fixtures/contracts/counter.tz");
        let result = common::run(&script, Some("reset"), "Unit", "3", &mut Context::default()).unwrap();
        assert_eq!(result.storage, Value::int(0));
        assert!(result.trace.is_empty());
    }

    // =======================================================================
    // Operations
    // =======================================================================

    #[test]
    fn originates_a_contract() {
        let script = common::script(
            "parameter unit ; storage (option address) ;
             code { DROP ; UNIT ; PUSH mutez 0 ; NONE key_hash ;
                    CREATE_CONTRACT { parameter unit ; storage unit ; code { CDR ; NIL operation ; PAIR } } ;
                    NIL operation ; SWAP ; CONS ; DIP { SOME } ; PAIR }",
        );
        let result = common::run(&script, None, "Unit", "None", &mut Context::default()).unwrap();
        let [Operation::Origination { address, balance, .. }] = result.operations.as_slice() else {
            panic!("expected one origination, got {:?}", result.operations);
        };
        assert_eq!(*balance, 0);
        assert!(address.to_string().starts_with("KT1"));
        assert_eq!(result.storage, Value::some(Value::Address(address.clone())));

        let json = result.operations[0].to_json();
        assert_eq!(json["kind"], "origination");
    }
}
