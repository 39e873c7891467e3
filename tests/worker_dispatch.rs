//! Hardware worker, dispatcher and controller working together against the
//! simulated receiver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sdr_tcp_bridge::config::WorkerConfig;
use sdr_tcp_bridge::controller::RadioController;
use sdr_tcp_bridge::device::simulated::Journal;
use sdr_tcp_bridge::device::{DeviceOp, DeviceSettings, FailAt, RspModel, SimulatedApi};
use sdr_tcp_bridge::errorlog::ErrorLog;
use sdr_tcp_bridge::sample::{create_shared_buffer, IqSample, SamplePipeline};
use sdr_tcp_bridge::worker::{Command, HardwareWorker, WorkerState};

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        command_timeout_ms: 50,
        idle_wait_ms: 10,
    }
}

fn pipeline() -> Arc<SamplePipeline> {
    SamplePipeline::shared(create_shared_buffer(1 << 16), 14, 2048)
}

fn start(api: SimulatedApi, pipeline: Arc<SamplePipeline>) -> (HardwareWorker, Journal) {
    let journal = api.journal();
    let worker = HardwareWorker::start(
        Box::new(api),
        DeviceSettings::default(),
        pipeline,
        Arc::new(ErrorLog::new()),
        &worker_config(),
    )
    .unwrap();
    (worker, journal)
}

#[test]
fn test_every_startup_failure_is_logged_with_its_code() {
    let cases = [
        (SimulatedApi::new(RspModel::Rsp1A).failing_at(FailAt::Library), 1),
        (SimulatedApi::new(RspModel::Rsp1A).failing_at(FailAt::Symbols), 2),
        (SimulatedApi::new(RspModel::Rsp1A).failing_at(FailAt::Open), 3),
        (SimulatedApi::new(RspModel::Rsp1A).failing_at(FailAt::VersionQuery), 4),
        (SimulatedApi::new(RspModel::Rsp1A).with_api_version(2.13), 5),
        (SimulatedApi::new(RspModel::Rsp1A).failing_at(FailAt::Enumerate), 6),
        (SimulatedApi::new(RspModel::Rsp1A).with_device_count(0), 7),
        (SimulatedApi::new(RspModel::Rsp1A).failing_at(FailAt::Select), 8),
        (SimulatedApi::new(RspModel::Rsp1A).failing_at(FailAt::ParamsFetch), 9),
        (SimulatedApi::new(RspModel::Rsp1A).failing_at(FailAt::ParamsNull), 10),
        (SimulatedApi::new(RspModel::Rsp1A).failing_at(FailAt::Init), 11),
    ];

    for (api, code) in cases {
        let log = Arc::new(ErrorLog::new());
        let journal = api.journal();
        let err = HardwareWorker::start(
            Box::new(api),
            DeviceSettings::default(),
            pipeline(),
            Arc::clone(&log),
            &worker_config(),
        )
        .err()
        .unwrap();

        assert_eq!(err.code(), code);
        let entries = log.entries();
        assert_eq!(entries.len(), 1, "code {}", code);
        assert!(entries[0].message.contains(&format!("startup error {}", code)));
        // whatever was opened has been closed again
        let ops = journal.lock();
        let opened = ops.contains(&DeviceOp::Open);
        assert_eq!(opened, ops.contains(&DeviceOp::Close), "code {}", code);
    }
}

#[test]
fn test_commands_run_in_submission_order_per_caller() {
    let (worker, journal) = start(SimulatedApi::new(RspModel::Rsp1A).without_stream(), pipeline());

    let callers: Vec<_> = (0..4u8)
        .map(|caller| {
            let dispatcher = worker.dispatcher();
            thread::spawn(move || {
                for n in 0..25u8 {
                    let tuner = caller * 25 + n;
                    assert!(dispatcher.submit(Command::SetTuner(tuner)));
                }
            })
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }

    let tuners: Vec<u8> = journal
        .lock()
        .iter()
        .filter_map(|op| match op {
            DeviceOp::SetTuner(t) => Some(*t),
            _ => None,
        })
        .collect();
    assert_eq!(tuners.len(), 100);
    for caller in 0..4u8 {
        let own: Vec<u8> = tuners.iter().copied().filter(|t| t / 25 == caller).collect();
        let expected: Vec<u8> = (0..25).map(|n| caller * 25 + n).collect();
        assert_eq!(own, expected);
    }
}

#[test]
fn test_submit_returns_after_device_call() {
    let (worker, journal) = start(SimulatedApi::new(RspModel::RspDx).without_stream(), pipeline());
    let dispatcher = worker.dispatcher();

    for khz in [200, 300, 600, 1536] {
        assert!(dispatcher.submit(Command::SetBandwidth(khz)));
        let count = journal
            .lock()
            .iter()
            .filter(|op| **op == DeviceOp::SetBandwidth(khz))
            .count();
        assert_eq!(count, 1);
    }
    assert_eq!(worker.device_state().unwrap().bandwidth_khz, 1536);
}

#[test]
fn test_stop_restart_flushes_once_per_transition() {
    let pipeline = pipeline();
    let (worker, _journal) = start(
        SimulatedApi::new(RspModel::Rsp1A).without_stream(),
        Arc::clone(&pipeline),
    );
    let radio = RadioController::new(worker, Arc::clone(&pipeline), 100_000_000);
    let buffer = Arc::clone(pipeline.buffer());

    assert!(radio.restart_reader(100_000_000));
    assert_eq!(buffer.flush_count(), 1);
    pipeline.push_samples(&[IqSample::new(100, -100); 500]);
    assert_eq!(buffer.available(), 500);

    radio.stop_reader();
    assert_eq!(buffer.flush_count(), 2);
    assert!(buffer.is_empty());
    // stopped receiver buffers nothing
    pipeline.push_samples(&[IqSample::new(1, 1); 10]);
    assert!(buffer.is_empty());

    assert!(radio.restart_reader(100_000_000));
    assert_eq!(buffer.flush_count(), 3);
    pipeline.push_samples(&[IqSample::new(1, 1); 300]);
    assert_eq!(buffer.available(), 300);

    // a second stop is a no-op
    radio.stop_reader();
    radio.stop_reader();
    assert_eq!(buffer.flush_count(), 4);
}

#[test]
fn test_concurrent_producer_survives_restart_cycles() {
    let pipeline = pipeline();
    let (worker, _journal) = start(
        SimulatedApi::new(RspModel::Rsp1A).without_stream(),
        Arc::clone(&pipeline),
    );
    let radio = RadioController::new(worker, Arc::clone(&pipeline), 100_000_000);
    assert!(radio.restart_reader(100_000_000));

    let producer = {
        let pipeline = Arc::clone(&pipeline);
        thread::spawn(move || {
            for _ in 0..200 {
                pipeline.push_samples(&[IqSample::new(7, 7); 64]);
            }
        })
    };
    for _ in 0..10 {
        radio.stop_reader();
        assert!(radio.restart_reader(100_000_000));
    }
    producer.join().unwrap();

    // every push lands whole or not at all
    assert_eq!(pipeline.buffer().available() % 64, 0);
    assert_eq!(pipeline.buffer().overflow_count(), 0);
}

#[test]
fn test_buffer_stays_empty_after_stop_under_load() {
    let pipeline = pipeline();
    let (worker, _journal) = start(
        SimulatedApi::new(RspModel::Rsp1A).without_stream(),
        Arc::clone(&pipeline),
    );
    let radio = RadioController::new(worker, Arc::clone(&pipeline), 100_000_000);

    let running = Arc::new(AtomicBool::new(true));
    let producer = {
        let pipeline = Arc::clone(&pipeline);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                pipeline.push_samples(&[IqSample::new(3, -3); 32]);
            }
        })
    };

    for _ in 0..20 {
        assert!(radio.restart_reader(100_000_000));
        thread::sleep(Duration::from_millis(2));
        radio.stop_reader();
        assert_eq!(pipeline.buffer().available(), 0);
        thread::sleep(Duration::from_millis(2));
        // the producer keeps calling in, but nothing is stored while stopped
        assert_eq!(pipeline.buffer().available(), 0);
    }

    running.store(false, Ordering::Relaxed);
    producer.join().unwrap();
}

#[test]
fn test_gating_is_asymmetric() {
    let pipeline = pipeline();
    let (worker, journal) = start(
        SimulatedApi::new(RspModel::Rsp2).without_stream(),
        Arc::clone(&pipeline),
    );
    let radio = RadioController::new(worker, pipeline, 100_000_000);

    assert!(!radio.set_frequency(90_000_000));
    assert!(!radio.set_gain(200));
    assert!(!radio.set_antenna(sdr_tcp_bridge::device::Antenna::B));
    assert!(radio.set_ppm(1.5));
    assert!(radio.set_bias_t(true));
    assert!(radio.set_notch(true));

    let ops = journal.lock();
    assert!(!ops.iter().any(|op| matches!(op, DeviceOp::SetVfo(_) | DeviceOp::SetGrdb(_))));
    assert!(ops.contains(&DeviceOp::SetPpm(1.5)));
}

#[test]
fn test_worker_closes_after_shutdown() {
    let (mut worker, journal) = start(SimulatedApi::new(RspModel::Rsp1).without_stream(), pipeline());
    let dispatcher = worker.dispatcher();
    assert!(dispatcher.submit(Command::Restart {
        frequency: 7_000_000
    }));

    worker.shutdown();
    assert_eq!(worker.state(), WorkerState::Closed);
    assert!(!dispatcher.submit(Command::SetTuner(1)));
    assert_eq!(journal.lock().last(), Some(&DeviceOp::ReleaseLibrary));
}
