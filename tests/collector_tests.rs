use std::sync::Arc;

use insta::assert_snapshot;
use proptest::prelude::*;
use procman::display::render_table;
use procman::system::collector::SnapshotCollector;
use procman::system::fixture::{FixtureProcess, FixtureSource};
use procman::system::snapshot::{ProcessSnapshot, SortKey};
use procman::system::source::CpuTimes;

fn cpu_total(user: u64, idle: u64) -> CpuTimes {
    CpuTimes {
        user,
        idle,
        ..CpuTimes::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn one_snapshot_per_pid_for_any_batch_size(count in 0u32..120, batch in 1usize..40) {
        let collector =
            SnapshotCollector::new(Arc::new(FixtureSource::with_processes(count)), batch);
        let set = collector.collect().unwrap();
        prop_assert_eq!(set.len(), count as usize);

        let mut pids: Vec<u32> = set.iter().map(|s| s.pid).collect();
        pids.sort_unstable();
        pids.dedup();
        prop_assert_eq!(pids.len(), count as usize);
    }
}

#[test]
fn batch_sizes_one_default_and_whole_list_agree() {
    let count = 47;
    for batch in [1, 15, count as usize] {
        let collector =
            SnapshotCollector::new(Arc::new(FixtureSource::with_processes(count)), batch);
        let set = collector.collect().unwrap();
        assert_eq!(set.len(), count as usize, "batch size {batch}");
        for pid in 1..=count {
            assert_eq!(set.get(pid).unwrap().name, format!("proc_{pid}"));
        }
    }
}

#[test]
fn cpu_share_follows_process_ticks_between_collections() {
    let source = Arc::new(FixtureSource::default());
    source.set_memory(1000 * 4096, 0);
    source.set_cpu_times(cpu_total(100, 100));
    source.insert(10, FixtureProcess::new("busy", 50, 250));
    source.insert(11, FixtureProcess::new("quiet", 5, 10));

    let collector = SnapshotCollector::new(source.clone(), 15);
    let first = collector.collect().unwrap();
    assert_eq!(first.get(10).map(|s| s.cpu_percent), Some(0.0));

    source.set_cpu_times(cpu_total(200, 200));
    source.set_process_ticks(10, 150);
    let second = collector.collect().unwrap();

    let busy = second.get(10).unwrap();
    assert!((busy.cpu_percent - 50.0).abs() < 1e-9);
    assert!((busy.memory_percent - 25.0).abs() < 1e-9);
    assert_eq!(second.get(11).map(|s| s.cpu_percent), Some(0.0));

    let order: Vec<u32> = second.sorted(SortKey::Cpu).iter().map(|s| s.pid).collect();
    assert_eq!(order, vec![10, 11]);
}

#[test]
fn plain_table_layout() {
    let rows = vec![
        ProcessSnapshot {
            pid: 1,
            name: "init".to_string(),
            cpu_percent: 0.0,
            memory_percent: 1.5,
        },
        ProcessSnapshot {
            pid: 42,
            name: "firefox".to_string(),
            cpu_percent: 62.25,
            memory_percent: 12.0,
        },
    ];
    assert_snapshot!(render_table(&rows, 30, false), @r"
    PID     CPU%      Memory%   Name
    ----------------------------------------
    1       0.00      1.50      init
    42      62.25     12.00     firefox
    ");
}
