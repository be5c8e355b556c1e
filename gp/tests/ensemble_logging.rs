//! Only the coordinator of an ensemble logs progress.
//!
//! The logger is process-wide, hence this file holds a single test.

use buckling_gp::{train_ensemble, TrainingParams};
use log::{Level, LevelFilter, Log, Metadata, Record};
use ndarray::{Array1, Array2};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::sync::Mutex;

struct CapturingLogger {
    lines: Mutex<Vec<String>>,
}

impl Log for CapturingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.lines.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger {
    lines: Mutex::new(Vec::new()),
};

fn synthetic_dataset(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n, 4), |(_, j)| match j {
        1 => rng.gen_range(-1.0..1.5),
        3 => rng.gen_range(0.0..1.5),
        _ => rng.gen_range(0.0..1.0),
    });
    let y = x
        .column(1)
        .mapv(|log_rho0| -0.5 * log_rho0 + 0.01 * rng.gen_range(-1.0..1.0));
    (x, y)
}

#[test]
fn test_ensemble_workers_are_silent() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Info);

    let (x, y) = synthetic_dataset(20, 3);
    let params = TrainingParams::default().n_train(12).n_test(8).max_eval(6);
    let models = train_ensemble(&params, &x, &y, &[11, 12, 13]).unwrap();
    assert_eq!(models.len(), 3);

    let lines = LOGGER.lines.lock().unwrap();
    let count = |pattern: &str| lines.iter().filter(|l| l.contains(pattern)).count();
    assert_eq!(count("Training on 12 / 20"), 1);
    assert!(count("stopped without converging") <= 1);
    assert!(count("did not converge") <= 1);
    assert_eq!(count("Final theta"), 1);
    // per evaluation progress comes from one worker only
    assert!(count("eval 1:") <= 1);
}
