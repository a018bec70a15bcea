use lanes_sim::feed::FaultConfig;
use lanes_sim::{SimulationConfig, Simulator};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_seed_converges(
        seed in any::<u64>(),
        clients in 1_usize..5,
        max_delay in 0_u8..4,
        duplicate in 0_u8..30,
        reorder in 0_u8..50,
    ) {
        let config = SimulationConfig {
            seed,
            client_count: clients,
            rounds: 10,
            fault: FaultConfig {
                max_delay_rounds: max_delay,
                duplicate_rate_percent: duplicate,
                reorder_rate_percent: reorder,
                write_failure_percent: 0,
            },
            ..SimulationConfig::default()
        };
        let result = Simulator::new(config).expect("new").run().expect("run");
        prop_assert!(result.oracle.passed, "seed {seed}: {:?}", result.oracle.violations);
    }

    #[test]
    fn write_failures_converge_after_refetch(seed in any::<u64>(), failures in 1_u8..60) {
        let config = SimulationConfig {
            seed,
            rounds: 10,
            fault: FaultConfig {
                write_failure_percent: failures,
                ..FaultConfig::default()
            },
            ..SimulationConfig::default()
        };
        let result = Simulator::new(config).expect("new").run().expect("run");
        prop_assert!(result.refetched);
        prop_assert!(result.oracle.passed, "seed {seed}: {:?}", result.oracle.violations);
    }
}

#[test]
fn trace_serializes_without_row_ids() {
    let result = Simulator::new(SimulationConfig {
        seed: 9,
        rounds: 6,
        ..SimulationConfig::default()
    })
    .expect("new")
    .run()
    .expect("run");
    let json = serde_json::to_value(&result.trace).expect("serialize");
    let first = &json[0];
    assert_eq!(first["round"], 0);
    assert_eq!(first["type"], "act");
    assert!(first.get("id").is_none());
}
