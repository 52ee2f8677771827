#![cfg(test)]

// Behavior is covered under tests/; this only pins the deployed program ids.

#[test]
fn program_ids_are_distinct() {
    let ids = [money_market::ID, liquidation_engine::ID, oracle_framework::ID];
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            assert_ne!(a, b);
        }
    }
}
