#[cfg(test)]
mod tests {
    use crate::engine::engine::{CycleEvent, ExecError, Snapshot, StationSnapshot};
    use crate::engine::reservation_station::{Operand, PoolKind, Tag};
    use crate::instructions::instructions::{RegisterType, WordType};
    use crate::loader::loader::load_from_string;
    use crate::simulator::{SimConfig, Simulator};

    const ADD1: Tag = Tag { pool: PoolKind::Add, index: 0 };
    const ADD2: Tag = Tag { pool: PoolKind::Add, index: 1 };
    const MUL1: Tag = Tag { pool: PoolKind::Mul, index: 0 };

    fn station(snapshot: &Snapshot, tag: Tag) -> &StationSnapshot {
        snapshot.stations.iter().find(|station| station.tag == tag).unwrap()
    }

    fn writebacks(snapshot: &Snapshot) -> usize {
        snapshot.events.iter()
            .filter(|event| matches!(event, CycleEvent::WroteBack { .. }))
            .count()
    }

    // With the default register file, register i holds i + 1.

    #[test]
    fn test_add() {
        let mut harness = TestHarness::default();
        harness.run("ADD R1, R2, R3");
        harness.assert_reg_value(1, 7);
        assert_eq!(harness.cycles(), 4);
    }

    #[test]
    fn test_same_src_dst_reg() {
        let mut harness = TestHarness::default();
        harness.run("ADD R1, R1, R1");
        harness.assert_reg_value(1, 4);
    }

    #[test]
    fn test_load_transform() {
        let mut harness = TestHarness::default();
        harness.run("LOAD R6, R0");
        harness.assert_reg_value(6, 101);
        assert_eq!(harness.cycles(), 3);
    }

    // The RAW round trip: the MUL's first operand must hold the ADD's tag,
    // not a value, and must only resolve on the ADD's write-back cycle. The
    // MUL must not start counting down before that cycle.
    #[test]
    fn test_raw_forwarding() {
        let mut harness = TestHarness::default();
        let snapshots = harness.run_collect("ADD R1, R2, R3\nMUL R4, R1, R5");

        harness.assert_reg_value(1, 7);
        harness.assert_reg_value(4, 42);
        assert_eq!(harness.cycles(), 14);

        // cycle 2: the MUL was just issued and waits on the ADD's station
        let mul = station(&snapshots[1], MUL1);
        assert!(mul.busy);
        assert_eq!(mul.source[0], Operand::Pending(ADD1));
        assert_eq!(mul.source[1], Operand::Value(6));

        // cycle 3: the ADD has finished executing but the MUL still waits
        let mul = station(&snapshots[2], MUL1);
        assert_eq!(mul.source[0], Operand::Pending(ADD1));
        assert_eq!(mul.exec_started_at, None);
        assert_eq!(mul.cycles_remaining, 10);

        // cycle 4: the ADD broadcasts; the MUL picks the value up and starts
        assert!(snapshots[3].events.contains(&CycleEvent::WroteBack { tag: ADD1, dest: 1, value: 7 }));
        let mul = station(&snapshots[3], MUL1);
        assert_eq!(mul.source[0], Operand::Value(7));
        assert_eq!(mul.exec_started_at, Some(4));
        assert!(!station(&snapshots[3], ADD1).busy);
    }

    // WAW: both producers target R1; the later ADD displaces the DIV in the
    // register status table, and the DIV's much later broadcast is stale and
    // must not overwrite the ADD's result.
    #[test]
    fn test_waw_last_issued_wins() {
        let mut harness = TestHarness::default();
        let snapshots = harness.run_collect("DIV R1, R2, R3\nADD R1, R4, R5");

        harness.assert_reg_value(1, 11);
        assert_eq!(harness.cycles(), 42);

        // cycle 5: the ADD has written back and cleared the rename
        let r1 = &snapshots[4].registers[1];
        assert_eq!(r1.value, 11);
        assert_eq!(r1.producer, None);

        // cycle 42: the DIV's stale broadcast left the register alone
        let r1 = &snapshots[41].registers[1];
        assert_eq!(r1.value, 11);
    }

    #[test]
    fn test_structural_hazard_stall() {
        let mut config = SimConfig::default();
        config.latencies.add = 10;
        let mut harness = TestHarness::with_config(config);

        let snapshots = harness.run_collect(
            "ADD R1, R2, R3\nADD R4, R5, R6\nADD R7, R8, R9\nADD R10, R0, R2");

        harness.assert_reg_value(1, 7);
        harness.assert_reg_value(4, 13);
        harness.assert_reg_value(7, 19);
        harness.assert_reg_value(10, 4);

        // the fourth ADD finds no free station from cycle 4 until the first
        // write-back frees one in cycle 12
        assert_eq!(harness.simulator.perf_counters().stall_cnt, 8);
        for snapshot in &snapshots[3..11] {
            assert!(snapshot.events.iter().any(|event| matches!(event, CycleEvent::Stalled { .. })));
        }
        let issued_4th = snapshots[11].events.iter().any(|event| match event {
            CycleEvent::Issued { tag, instr } => *tag == ADD1 && instr.dest == 10,
            _ => false,
        });
        assert!(issued_4th);
        assert_eq!(station(&snapshots[11], ADD1).issued_at, Some(12));

        // the additive pool never holds more than its three stations
        for snapshot in &snapshots {
            let busy = snapshot.stations.iter()
                .filter(|station| station.tag.pool == PoolKind::Add && station.busy)
                .count();
            assert!(busy <= 3);
        }

        assert_eq!(harness.cycles(), 23);
    }

    // Two stations complete in the same cycle; the bus carries one result
    // per cycle, so the second keeps its result and wins the bus a cycle
    // later.
    #[test]
    fn test_cdb_contention() {
        let mut config = SimConfig::default();
        config.latencies.add = 3;
        let mut harness = TestHarness::with_config(config);

        let snapshots = harness.run_collect("ADD R1, R2, R3\nSUB R4, R5, R6");

        harness.assert_reg_value(1, 7);
        harness.assert_reg_value(4, -1);
        assert_eq!(harness.cycles(), 6);

        for snapshot in &snapshots {
            assert!(writebacks(snapshot) <= 1);
        }

        // cycle 5: only the additive pool's first slot wins the bus
        assert!(snapshots[4].events.contains(&CycleEvent::WroteBack { tag: ADD1, dest: 1, value: 7 }));
        let loser = station(&snapshots[4], ADD2);
        assert!(loser.busy);
        assert_eq!(loser.cycles_remaining, 0);

        assert!(snapshots[5].events.contains(&CycleEvent::WroteBack { tag: ADD2, dest: 4, value: -1 }));
    }

    #[test]
    fn test_division_by_zero() {
        let mut harness = TestHarness::default();
        let snapshots = harness.run_collect("SUB R0, R2, R2\nDIV R3, R1, R0");

        // the faulted DIV frees its station and leaves R3 untouched
        harness.assert_reg_value(0, 0);
        harness.assert_reg_value(3, 4);
        assert_eq!(harness.cycles(), 44);

        let last = snapshots.last().unwrap();
        assert!(last.events.contains(&CycleEvent::Faulted { tag: MUL1, error: ExecError::DivisionByZero }));
        assert!(last.stations.iter().all(|station| !station.busy));
        assert_eq!(last.registers[3].producer, None);
    }

    // A station waiting on a faulted producer can never become ready; it is
    // released as well and its rename is undone.
    #[test]
    fn test_fault_cancels_waiters() {
        let mut harness = TestHarness::default();
        let snapshots = harness.run_collect("SUB R0, R2, R2\nDIV R3, R1, R0\nADD R6, R3, R2");

        harness.assert_reg_value(6, 7);
        assert_eq!(harness.cycles(), 44);

        let last = snapshots.last().unwrap();
        assert!(last.events.contains(&CycleEvent::Faulted { tag: MUL1, error: ExecError::DivisionByZero }));
        assert!(last.events.contains(&CycleEvent::Cancelled { tag: ADD2, waiting_on: MUL1 }));
        assert!(last.stations.iter().all(|station| !station.busy));
    }

    // An identical program on an identical configuration produces an
    // identical cycle-by-cycle snapshot sequence.
    #[test]
    fn test_determinism() {
        let src = "ADD R1, R2, R3\nMUL R4, R1, R5\nSUB R6, R7, R8";

        let mut first = TestHarness::default();
        let mut second = TestHarness::default();
        assert_eq!(first.run_collect(src), second.run_collect(src));
    }

    #[test]
    fn test_initial_regs_override() {
        let mut config = SimConfig::default();
        config.initial_regs = Some(vec![0, 9, 3]);
        let mut harness = TestHarness::with_config(config);

        harness.run("DIV R3, R1, R2");
        harness.assert_reg_value(0, 0);
        harness.assert_reg_value(3, 3);
    }

    #[test]
    fn test_unsupported_operation_is_dropped() {
        let mut harness = TestHarness::default();
        harness.run("NOP R1, R2, R3\nADD R1, R2, R3");
        harness.assert_reg_value(1, 7);
        assert_eq!(harness.cycles(), 4);
    }

    struct TestHarness {
        config: SimConfig,
        simulator: Simulator,
    }

    impl TestHarness {
        fn default() -> TestHarness {
            Self::with_config(SimConfig::default())
        }

        fn with_config(config: SimConfig) -> TestHarness {
            TestHarness {
                simulator: Simulator::new(&config),
                config,
            }
        }

        fn load(&mut self, src: &str) {
            let program = match load_from_string(&self.config, src) {
                Ok(program) => program,
                Err(error) => panic!("loading test program failed: {}", error),
            };
            self.simulator.init(&program);
        }

        fn run(&mut self, src: &str) {
            self.load(src);
            while self.simulator.step().is_some() {}
        }

        fn run_collect(&mut self, src: &str) -> Vec<Snapshot> {
            self.load(src);
            let mut snapshots = Vec::new();
            while let Some(snapshot) = self.simulator.step() {
                snapshots.push(snapshot);
            }
            snapshots
        }

        fn assert_reg_value(&self, reg: RegisterType, value: WordType) {
            assert_eq!(self.simulator.reg_value(reg), value,
                       "R{} does not have the expected value", reg);
        }

        fn cycles(&self) -> u64 {
            self.simulator.perf_counters().cycle_cnt
        }
    }
}
