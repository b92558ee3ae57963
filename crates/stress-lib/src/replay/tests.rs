//! Scenario tests for the replay simulator
//!
//! These use small in-memory datasets whose rows are tagged through the X
//! value, so the row behind each emitted record can be identified.

#[cfg(test)]
mod simulator_tests {
    use crate::error::ReplayError;
    use crate::models::{Label, LabeledReading, ReplayRecord, SensorReading};
    use crate::predictor::parse_timestamp;
    use crate::replay::{
        CursorKey, HistoricalDataset, ReadingLog, ReplayMode, ReplayOptions, ReplayRunner,
        ReplaySimulator, SimulatorPhase,
    };
    use chrono::Duration;
    use std::sync::{Arc, Mutex};
    use tokio::sync::broadcast;

    /// Row `i` has X = i and the given label
    fn dataset(labels: &[u8]) -> Arc<HistoricalDataset> {
        let rows = labels
            .iter()
            .enumerate()
            .map(|(i, label)| LabeledReading {
                reading: SensorReading {
                    x: i as f64,
                    y: 1.0,
                    z: 2.0,
                    eda: 0.3,
                    hr: 70.0 + *label as f64 * 15.0,
                    temp: 31.5,
                    datetime: "2020-05-08 22:11:34".to_string(),
                    id: None,
                },
                label: Label(*label),
            })
            .collect();
        Arc::new(HistoricalDataset::from_rows(rows))
    }

    fn seeded(shuffle: bool) -> ReplayOptions {
        ReplayOptions {
            shuffle,
            seed: Some(7),
            ..Default::default()
        }
    }

    fn row_of(record: &ReplayRecord) -> usize {
        record.x as usize
    }

    #[test]
    fn test_starts_ready_with_clock_from_first_row() {
        let simulator = ReplaySimulator::new(dataset(&[0, 1, 2]), seeded(false));
        assert_eq!(simulator.phase(), SimulatorPhase::Ready);
        assert_eq!(simulator.state().clock().to_string(), "2020-05-08 22:11:34");
        assert_eq!(simulator.state().cursor(CursorKey::All), 0);
    }

    #[test]
    fn test_sequential_wraps_after_dataset_length() {
        let mut simulator = ReplaySimulator::new(dataset(&[0, 1, 2, 0, 1]), seeded(false));
        let first = simulator.advance(ReplayMode::AllSequential).unwrap();
        assert_eq!(simulator.phase(), SimulatorPhase::Streaming);
        for _ in 1..5 {
            simulator.advance(ReplayMode::AllSequential).unwrap();
        }
        let wrapped = simulator.advance(ReplayMode::AllSequential).unwrap();
        assert_eq!(row_of(&wrapped), row_of(&first));
        assert_eq!(row_of(&first), 0);
    }

    #[test]
    fn test_each_row_seen_once_per_cycle() {
        let mut simulator = ReplaySimulator::new(dataset(&[0, 1, 2, 0, 1, 2, 2]), seeded(false));
        let mut rows: Vec<usize> = simulator
            .stream(ReplayMode::AllSequential)
            .take(7)
            .map(|r| row_of(&r))
            .collect();
        rows.sort_unstable();
        assert_eq!(rows, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_timestamps_step_one_second_in_every_mode() {
        let mut simulator = ReplaySimulator::new(dataset(&[0, 1, 2, 2, 1]), seeded(true));
        let modes = [
            ReplayMode::AllSequential,
            ReplayMode::AllRandom,
            ReplayMode::FilteredSequential(Label(2)),
            ReplayMode::FilteredRandom(Label(1)),
            ReplayMode::Cycling,
            ReplayMode::FilteredSequential(Label(9)),
        ];
        let stamps: Vec<String> = (0..60)
            .map(|i| simulator.advance(modes[i % modes.len()]).unwrap().timestamp)
            .collect();

        assert_eq!(stamps[0], "2020-05-08 22:11:34.000000");
        for pair in stamps.windows(2) {
            let a = parse_timestamp(&pair[0]).unwrap();
            let b = parse_timestamp(&pair[1]).unwrap();
            assert_eq!(b - a, Duration::seconds(1));
        }
    }

    #[test]
    fn test_filtered_sequential_walks_only_that_label() {
        let mut simulator = ReplaySimulator::new(dataset(&[0, 2, 1, 2, 0, 2]), seeded(false));
        let rows: Vec<usize> = (0..4)
            .map(|_| row_of(&simulator.advance(ReplayMode::FilteredSequential(Label(2))).unwrap()))
            .collect();
        assert_eq!(rows, vec![1, 3, 5, 1]);
    }

    #[test]
    fn test_filtered_random_stays_within_label() {
        let data = dataset(&[0, 2, 1, 2, 0, 2]);
        let mut simulator = ReplaySimulator::new(data.clone(), seeded(true));
        for _ in 0..50 {
            let record = simulator.advance(ReplayMode::FilteredRandom(Label(0))).unwrap();
            assert_eq!(data.row(row_of(&record)).unwrap().label, Label(0));
        }
        assert_eq!(simulator.state().cursor(CursorKey::Label(Label(0))), 0);
    }

    #[test]
    fn test_interleaved_cursors_do_not_interfere() {
        let mut simulator = ReplaySimulator::new(dataset(&[0, 1, 0, 1, 0, 1]), seeded(false));
        let mut all = Vec::new();
        let mut ones = Vec::new();
        for _ in 0..3 {
            all.push(row_of(&simulator.advance(ReplayMode::AllSequential).unwrap()));
            ones.push(row_of(&simulator.advance(ReplayMode::FilteredSequential(Label(1))).unwrap()));
            simulator.advance(ReplayMode::AllRandom).unwrap();
        }
        assert_eq!(all, vec![0, 1, 2]);
        assert_eq!(ones, vec![1, 3, 5]);
    }

    #[test]
    fn test_absent_label_falls_back_to_full_dataset() {
        let mut simulator = ReplaySimulator::new(dataset(&[0, 1, 2]), seeded(false));
        let rows: Vec<usize> = (0..4)
            .map(|_| row_of(&simulator.advance(ReplayMode::FilteredSequential(Label(5))).unwrap()))
            .collect();
        assert_eq!(rows, vec![0, 1, 2, 0]);
        assert_eq!(simulator.state().cursor(CursorKey::All), 0);
    }

    #[test]
    fn test_cycling_rotates_labels_every_period() {
        let data = dataset(&[0, 1, 2, 0, 1, 2, 0, 1, 2]);
        let mut simulator = ReplaySimulator::new(data.clone(), seeded(false));
        let labels: Vec<Label> = (0..30)
            .map(|_| {
                let record = simulator.advance(ReplayMode::Cycling).unwrap();
                data.row(row_of(&record)).unwrap().label
            })
            .collect();

        assert!(labels[0..10].iter().all(|l| *l == Label(1)));
        assert!(labels[10..20].iter().all(|l| *l == Label(2)));
        assert!(labels[20..30].iter().all(|l| *l == Label(0)));
        assert_eq!(simulator.active_cycle_label(), Some(Label(0)));
    }

    #[test]
    fn test_cycling_shuffle_still_respects_active_label() {
        let data = dataset(&[0, 1, 2, 0, 1, 2]);
        let options = ReplayOptions {
            cycle_period: 3,
            ..seeded(true)
        };
        let mut simulator = ReplaySimulator::new(data.clone(), options);
        let labels: Vec<u8> = (0..9)
            .map(|_| {
                let record = simulator.advance(ReplayMode::Cycling).unwrap();
                data.row(row_of(&record)).unwrap().label.0
            })
            .collect();
        assert_eq!(labels, vec![1, 1, 1, 2, 2, 2, 0, 0, 0]);
    }

    #[test]
    fn test_cycling_skips_labels_missing_from_dataset() {
        let data = dataset(&[0, 2, 0, 2]);
        let options = ReplayOptions {
            cycle_period: 2,
            ..seeded(false)
        };
        let mut simulator = ReplaySimulator::new(data.clone(), options);
        let labels: Vec<u8> = (0..6)
            .map(|_| {
                let record = simulator.advance(ReplayMode::Cycling).unwrap();
                data.row(row_of(&record)).unwrap().label.0
            })
            .collect();
        assert_eq!(labels, vec![2, 2, 0, 0, 2, 2]);
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let data = dataset(&[0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
        let run = || {
            let mut simulator = ReplaySimulator::new(data.clone(), seeded(true));
            simulator
                .stream(ReplayMode::AllRandom)
                .take(20)
                .map(|r| row_of(&r))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_empty_dataset_uses_wall_clock_and_refuses_to_advance() {
        let before = chrono::Local::now().naive_local() - Duration::seconds(1);
        let mut simulator = ReplaySimulator::new(dataset(&[]), seeded(false));
        assert!(simulator.state().clock() >= before);
        assert!(matches!(
            simulator.advance(ReplayMode::AllSequential),
            Err(ReplayError::EmptyDataset)
        ));
        assert_eq!(simulator.state().advances(), 0);
        assert_eq!(simulator.stream(ReplayMode::Cycling).count(), 0);
    }

    #[test]
    fn test_unparseable_first_timestamp_uses_wall_clock() {
        let rows = vec![LabeledReading {
            reading: SensorReading {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                eda: 0.0,
                hr: 0.0,
                temp: 0.0,
                datetime: "garbled".to_string(),
                id: None,
            },
            label: Label(0),
        }];
        let before = chrono::Local::now().naive_local() - Duration::seconds(1);
        let simulator =
            ReplaySimulator::new(Arc::new(HistoricalDataset::from_rows(rows)), seeded(false));
        assert!(simulator.state().clock() >= before);
    }

    #[test]
    fn test_stop_and_restart() {
        let mut simulator = ReplaySimulator::new(dataset(&[0, 1, 2]), seeded(false));
        simulator.advance(ReplayMode::AllSequential).unwrap();
        simulator.advance(ReplayMode::AllSequential).unwrap();

        simulator.stop();
        assert_eq!(simulator.phase(), SimulatorPhase::Stopped);
        assert!(matches!(
            simulator.advance(ReplayMode::AllSequential),
            Err(ReplayError::Stopped)
        ));

        simulator.restart();
        assert_eq!(simulator.phase(), SimulatorPhase::Ready);
        let record = simulator.advance(ReplayMode::AllSequential).unwrap();
        assert_eq!(row_of(&record), 0);
        assert_eq!(record.timestamp, "2020-05-08 22:11:34.000000");
    }

    #[test]
    fn test_missing_dataset_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ReplaySimulator::load(&dir.path().join("balanced_data.csv"), seeded(false))
            .err()
            .unwrap();
        assert!(matches!(err, ReplayError::DatasetNotFound(_)));
    }

    #[test]
    fn test_mode_from_flags() {
        assert_eq!(
            ReplayMode::from_flags(Some(Label(2)), true, true),
            ReplayMode::FilteredSequential(Label(2))
        );
        assert_eq!(ReplayMode::from_flags(None, true, false), ReplayMode::Cycling);
        assert_eq!(ReplayMode::from_flags(None, false, true), ReplayMode::AllSequential);
        assert_eq!(ReplayMode::from_flags(None, false, false), ReplayMode::AllRandom);
    }

    #[test]
    fn test_concurrent_advances_keep_timestamps_unique() {
        let simulator = Arc::new(Mutex::new(ReplaySimulator::new(
            dataset(&[0, 1, 2, 0]),
            seeded(false),
        )));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let simulator = simulator.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| {
                            simulator
                                .lock()
                                .unwrap()
                                .advance(ReplayMode::AllSequential)
                                .unwrap()
                                .timestamp
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut stamps: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        stamps.sort();
        stamps.dedup();
        assert_eq!(stamps.len(), 100);
        assert_eq!(simulator.lock().unwrap().state().advances(), 100);
    }

    #[tokio::test]
    async fn test_runner_writes_limited_records_to_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sensor_data.json");
        let simulator = Arc::new(Mutex::new(ReplaySimulator::new(
            dataset(&[0, 1, 2]),
            seeded(false),
        )));
        let log = ReadingLog::with_persistence(path.clone(), 2);
        let runner = ReplayRunner::new(
            simulator.clone(),
            log,
            ReplayMode::AllSequential,
            std::time::Duration::from_millis(1),
        );

        let (_tx, rx) = broadcast::channel(1);
        let summary = runner.run(rx, Some(5)).await.unwrap();
        assert_eq!(summary.records, 5);
        assert_eq!(
            summary.last_timestamp.as_deref(),
            Some("2020-05-08 22:11:38.000000")
        );

        let written: Vec<ReplayRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[1].timestamp, "2020-05-08 22:11:38.000000");
        assert_eq!(simulator.lock().unwrap().phase(), SimulatorPhase::Stopped);
    }

    #[tokio::test]
    async fn test_runner_stops_on_shutdown() {
        let simulator = Arc::new(Mutex::new(ReplaySimulator::new(
            dataset(&[0, 1]),
            seeded(false),
        )));
        let runner = ReplayRunner::new(
            simulator,
            ReadingLog::new(10),
            ReplayMode::AllSequential,
            std::time::Duration::from_secs(3600),
        );
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(runner.run(rx, None));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        let summary = handle.await.unwrap().unwrap();
        // The first tick fires immediately
        assert_eq!(summary.records, 1);
    }

    #[tokio::test]
    async fn test_runner_surfaces_empty_dataset() {
        let simulator = Arc::new(Mutex::new(ReplaySimulator::new(dataset(&[]), seeded(false))));
        let runner = ReplayRunner::new(
            simulator,
            ReadingLog::new(10),
            ReplayMode::AllSequential,
            std::time::Duration::from_millis(1),
        );
        let (_tx, rx) = broadcast::channel(1);
        assert!(runner.run(rx, None).await.is_err());
    }
}

#[cfg(test)]
mod config_tests {
    use crate::models::{Label, LabeledReading, SensorReading};
    use crate::replay::{
        HistoricalDataset, ReplayConfig, ReplayMode, ReplayRunner, ReplaySimulator,
        DEFAULT_CYCLE_PERIOD,
    };
    use std::io::Write;
    use std::sync::Arc;

    #[test]
    fn test_default_config() {
        let config = ReplayConfig::default();
        assert_eq!(config.mode(), ReplayMode::AllRandom);
        assert_eq!(config.log_capacity, 1000);
        assert_eq!(config.options().cycle_period, DEFAULT_CYCLE_PERIOD);
        assert!(config.options().shuffle);
    }

    #[test]
    fn test_runner_from_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let dataset = dir.path().join("balanced_data.csv");
        let mut file = std::fs::File::create(&dataset).unwrap();
        writeln!(file, "X,Y,Z,EDA,HR,TEMP,datetime,label").unwrap();
        writeln!(file, "-21,-53,27,0.21,75.07,30.37,2020-05-08 22:11:34,1.0").unwrap();
        writeln!(file, "-20,-50,25,0.20,70.00,30.10,2020-05-08 22:11:35,0.0").unwrap();

        let config = ReplayConfig {
            dataset,
            label: Some(Label(1)),
            sequential: true,
            log_path: dir.path().join("out.json"),
            ..Default::default()
        };
        let mut runner = ReplayRunner::from_config(&config).unwrap();
        let record = runner.step().unwrap();
        assert_eq!(record.x, -21.0);
        assert_eq!(runner.log().len(), 1);
        assert!(dir.path().join("out.json").exists());
    }

    #[test]
    fn test_sequential_cycling_walks_rows_in_order() {
        let rows = [0u8, 1, 1, 1, 1, 1, 2]
            .iter()
            .enumerate()
            .map(|(i, label)| LabeledReading {
                reading: SensorReading {
                    x: i as f64,
                    y: 0.0,
                    z: 0.0,
                    eda: 0.0,
                    hr: 0.0,
                    temp: 0.0,
                    datetime: "2020-05-08 22:11:34".to_string(),
                    id: None,
                },
                label: Label(*label),
            })
            .collect();
        let config = ReplayConfig {
            cycle: true,
            sequential: true,
            seed: Some(3),
            ..Default::default()
        };
        assert_eq!(config.mode(), ReplayMode::Cycling);
        assert!(!config.options().shuffle);

        let mut simulator =
            ReplaySimulator::new(Arc::new(HistoricalDataset::from_rows(rows)), config.options());
        let xs: Vec<f64> = (0..5)
            .map(|_| simulator.advance(config.mode()).unwrap().x)
            .collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_random_cycling_shuffles() {
        let config = ReplayConfig {
            cycle: true,
            ..Default::default()
        };
        assert!(config.options().shuffle);
    }
}
