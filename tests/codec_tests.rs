//! Codec tests: text and JSON forms of contracts, PACK vectors, and
//! randomized pack/unpack checks.
//!
//! The text reader keeps macros as written; only the binary form needs the
//! expanded script, since macro names have no primitive code.

mod common;

#[cfg(test)]
mod tests {
    use crate::common;
    use michelson::micheline::{pack, script_expr_hash, unpack, Micheline};
    use michelson::runtime::{Mode, Script, Type, Value};
    use michelson::text::read;
    use num_bigint::BigInt;
    use rand::distributions::Alphanumeric;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;
    use std::fs;

    fn read_fixture(path: &str) -> String {
        fs::read_to_string(path).unwrap_or_else(|e| panic!("cannot read {path}: {e}"))
    }

    // =======================================================================
    // Text and JSON forms
    // =======================================================================

    #[test]
    fn contract_text_matches_json() {
        let text = read(&read_fixture("tests/fixtures/contracts/counter.tz")).unwrap();
        let json = Micheline::from_json(&read_fixture("tests/fixtures/contracts/counter.json")).unwrap();
        assert_eq!(text, json);

        let from_text = common::load_script("tests/fixtures/contracts/counter.tz");
        let from_json = Script::from_micheline(&json).unwrap();
        assert_eq!(from_text, from_json);
    }

    #[rstest]
    #[case("tests/fixtures/contracts/counter.tz")]
    #[case("tests/fixtures/contracts/registry.tz")]
    #[case("tests/fixtures/contracts/swap_maps.tz")]
    #[case("tests/fixtures/contracts/auction.tz")]
    fn printed_forms_read_back(#[case] path: &str) {
        let node = read(&read_fixture(path)).unwrap();

        let compact = node.to_string();
        assert_eq!(read(&compact).unwrap(), node, "compact form of {path}");
        let indented = format!("{node:#}");
        assert_eq!(read(&indented).unwrap(), node, "indented form of {path}");

        let json = node.to_json();
        assert_eq!(Micheline::from_json(&json).unwrap(), node, "JSON form of {path}");

        let expanded = common::load_script(path).to_micheline(Mode::Optimized);
        let encoded = pack(&expanded).unwrap();
        assert_eq!(unpack(&encoded).unwrap(), expanded, "binary form of {path}");
    }

    #[test]
    fn script_round_trip_expands_macros() {
        let script = common::load_script("tests/fixtures/contracts/auction.tz");
        let node = script.to_micheline(Mode::Readable);
        let printed = node.to_string();
        assert!(!printed.contains("IFCMPLE"));
        assert!(!printed.contains("ASSERT_SOME"));
        assert_eq!(Script::from_micheline(&node).unwrap(), script);
    }

    // =======================================================================
    // PACK vectors
    // =======================================================================

    #[rstest]
    #[case("nat", "1", "050001")]
    #[case("int", "-64", "0500c001")]
    #[case("string", "\"a\"", "05010000000161")]
    #[case("pair nat string", "Pair 1 \"a\"", "0507070001010000000161")]
    #[case("option unit", "Some Unit", "050509030b")]
    #[case("list int", "{ 1 ; 2 }", "05020000000400010002")]
    #[case("lambda unit unit", "{ DROP ; UNIT }", "0502000000040320034f")]
    #[case(
        "address",
        "\"tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb\"",
        "050a0000001600006b82198cb179e8306c1bedd08f12dc863f328886"
    )]
    fn pack_vectors(#[case] ty: &str, #[case] value: &str, #[case] expected: &str) {
        let ty = common::ty(ty);
        let value = common::value(&ty, value);
        let packed = value.pack().unwrap();
        assert_eq!(hex::encode(&packed), expected);
        assert_eq!(Value::unpack(&packed, &ty).unwrap(), value);
    }

    #[test]
    fn key_hash_vector() {
        assert_eq!(
            script_expr_hash(&Micheline::int(1)).unwrap(),
            "expru2dKqDfZG8hu4wNGkiyunvq2hdSKuVYtcKta7BWP6Q18oNxKjS"
        );
    }

    // =======================================================================
    // Randomized
    // =======================================================================

    #[test]
    fn zarith_random_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x4d69_6368);
        for _ in 0..500 {
            let len = rng.gen_range(1..48);
            let mut bytes = vec![0u8; len];
            rng.fill(&mut bytes[..]);
            let n = BigInt::from_signed_bytes_be(&bytes);

            let node = Micheline::Int(n.clone());
            let packed = pack(&node).unwrap();
            assert_eq!(unpack(&packed).unwrap(), node, "round trip of {n}");
        }
    }

    #[test]
    fn typed_random_round_trip() {
        let mut rng = StdRng::seed_from_u64(7);
        let ty = Type::pair(Type::int(), Type::list(Type::string()));
        for _ in 0..100 {
            let items = (0..rng.gen_range(0..5))
                .map(|_| {
                    let len = rng.gen_range(0..12);
                    let text: String = (&mut rng).sample_iter(&Alphanumeric).take(len).map(char::from).collect();
                    Value::string(text)
                })
                .collect();
            let value = Value::pair(Value::int(rng.gen::<i64>()), Value::List(items));
            let packed = value.pack().unwrap();
            assert_eq!(Value::unpack(&packed, &ty).unwrap(), value);
        }
    }
}
