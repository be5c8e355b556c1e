//! Train the Gaussian process surrogate of panel critical buckling loads.
//!
//! Logging is configured through the `BUCKLING_LOG` environment variable
//! (default `info`), the rayon pool size through `--threads` or
//! `RAYON_NUM_THREADS`.

mod io;

use anyhow::{bail, Context, Result};
use buckling_gp::kernels::BucklingKernel;
use buckling_gp::{
    shuffle_split, train_ensemble, Algorithm, CompositeMaterial, MapProblem, TrainedModel,
    TrainingParams, DEFAULT_MAX_EVAL, DEFAULT_N_TEST, DEFAULT_N_TRAIN, DEFAULT_SEED, N_THETA,
    THETA0, THETA_NAMES,
};
use clap::{Args, Parser, Subcommand};
use env_logger::{Builder, Env};
use io::{read_dataset, LoadCase};
use linfa::prelude::*;
use log::info;
use ndarray::{Array1, Array2};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use std::path::{Path, PathBuf};
use std::time::Instant;

const BUCKLING_LOG: &str = "BUCKLING_LOG";

#[derive(Parser)]
#[command(
    name = "ml-buckling",
    version,
    about = "Gaussian process surrogate of composite panel buckling loads"
)]
struct Cli {
    /// Number of worker threads, defaults to RAYON_NUM_THREADS or all cores
    #[arg(long, global = true, value_name = "N")]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Load case selecting the default dataset
    #[arg(long, value_enum, default_value_t = LoadCase::Nx)]
    load: LoadCase,

    /// Dataset CSV file, overrides the load case default
    #[arg(long, value_name = "CSV")]
    data: Option<PathBuf>,

    /// Number of training rows
    #[arg(long, default_value_t = DEFAULT_N_TRAIN)]
    ntrain: usize,

    /// Number of held-out rows
    #[arg(long, default_value_t = DEFAULT_N_TEST)]
    ntest: usize,

    /// Seed of the dataset permutation
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
}

impl DataArgs {
    fn load_data(&self) -> Result<(Array2<f64>, Array1<f64>)> {
        let path = self.data.clone().unwrap_or_else(|| self.load.default_file());
        let (x, y) = read_dataset(&path)?;
        info!(
            "{} load case: {} rows read from {}",
            self.load,
            y.len(),
            path.display()
        );
        Ok((x, y))
    }

    fn problem(&self) -> Result<MapProblem<BucklingKernel>> {
        let (x, y) = self.load_data()?;
        let split = shuffle_split(&x, &y, self.ntrain, self.ntest, self.seed)?;
        Ok(MapProblem::new(BucklingKernel::default(), split.train, split.test)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize the kernel hyperparameters
    Train {
        #[command(flatten)]
        data: DataArgs,

        /// Max number of objective evaluations
        #[arg(long, default_value_t = DEFAULT_MAX_EVAL)]
        max_eval: usize,

        /// Optimization algorithm (slsqp or cobyla)
        #[arg(long, default_value_t = Algorithm::Slsqp)]
        algorithm: Algorithm,

        /// Number of independent trainings on consecutive seeds
        #[arg(long, default_value_t = 1)]
        ensemble: usize,

        /// Save the trained model(s) as JSON
        #[arg(long, value_name = "JSON")]
        output: Option<PathBuf>,
    },

    /// Time one objective and one gradient evaluation at the initial theta
    Profile {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Check the analytic gradient against complex-step derivatives
    CheckDerivs {
        #[command(flatten)]
        data: DataArgs,

        /// Check a single hyperparameter instead of a random direction
        #[arg(long, value_name = "IDX")]
        component: Option<usize>,

        /// Relative tolerance for the check to pass
        #[arg(long, default_value_t = 1e-4)]
        tol: f64,
    },

    /// Print the composite material catalog
    Materials,
}

fn init_logger() {
    let env = Env::new().filter_or(BUCKLING_LOG, "info");
    let mut builder = Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();
}

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    if let Some(n) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("Cannot configure the thread pool")?;
    }

    match cli.command {
        Commands::Train {
            data,
            max_eval,
            algorithm,
            ensemble,
            output,
        } => train_command(&data, max_eval, algorithm, ensemble, output),
        Commands::Profile { data } => profile_command(&data),
        Commands::CheckDerivs {
            data,
            component,
            tol,
        } => check_derivs_command(&data, component, tol),
        Commands::Materials => {
            materials_command();
            Ok(())
        }
    }
}

fn train_command(
    data: &DataArgs,
    max_eval: usize,
    algorithm: Algorithm,
    ensemble: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    if ensemble == 0 {
        bail!("--ensemble must be at least 1");
    }
    let (x, y) = data.load_data()?;
    info!(
        "Monte Carlo #data training {} / {} data points",
        data.ntrain,
        y.len()
    );
    let params = TrainingParams::default()
        .n_train(data.ntrain)
        .n_test(data.ntest)
        .seed(data.seed)
        .algorithm(algorithm)
        .max_eval(max_eval);

    let models: Vec<TrainedModel> = if ensemble == 1 {
        vec![params.fit(&Dataset::new(x, y))?]
    } else {
        let seeds: Vec<u64> = (0..ensemble as u64).map(|i| data.seed + i).collect();
        train_ensemble(&params, &x, &y, &seeds)?
    };

    for model in models.iter() {
        println!("seed {}: {}", model.seed(), model);
        for (name, value) in THETA_NAMES.iter().zip(model.theta()) {
            println!("  {name:<28} {value:.6}");
        }
    }

    if let Some(path) = output {
        if models.len() == 1 {
            save(&models[0], &path)?;
        } else {
            for model in models.iter() {
                let stem = path.file_stem().unwrap_or_default().to_string_lossy();
                let file = path.with_file_name(format!("{stem}_{}.json", model.seed()));
                save(model, &file)?;
            }
        }
    }
    Ok(())
}

fn save(model: &TrainedModel, path: &Path) -> Result<()> {
    let file = path.to_string_lossy();
    model
        .save(&file)
        .with_context(|| format!("Cannot save model to {file}"))?;
    info!("Model saved to {file}");
    Ok(())
}

fn profile_command(data: &DataArgs) -> Result<()> {
    let problem = data.problem()?;
    let theta = Array1::from_vec(THETA0.to_vec());

    let now = Instant::now();
    let (obj, alpha) = problem.nmap(&theta)?;
    let t_obj = now.elapsed();

    let now = Instant::now();
    let grad = problem.nmap_grad(&theta)?;
    let t_grad = now.elapsed();

    println!("nMAP = {obj:.6e} in {:.3} s", t_obj.as_secs_f64());
    println!("gradient ({N_THETA} entries) in {:.3} s", t_grad.as_secs_f64());
    println!("|grad| = {:.6e}", grad.dot(&grad).sqrt());
    if problem.test().records().nrows() > 0 {
        println!("avg rel err = {:.6}", problem.post_evaluate(&theta, &alpha)?);
    }
    Ok(())
}

fn check_derivs_command(data: &DataArgs, component: Option<usize>, tol: f64) -> Result<()> {
    let problem = data.problem()?;
    let theta = Array1::from_vec(THETA0.to_vec());
    let check = match component {
        Some(idx) => problem.check_gradient_component(&theta, idx)?,
        None => {
            let mut rng = Xoshiro256Plus::seed_from_u64(data.seed);
            let direction = Array1::random_using(N_THETA, Uniform::new(0., 1.), &mut rng);
            problem.check_gradient(&theta, &direction)?
        }
    };
    println!("complex step  = {:.10e}", check.complex_step);
    println!("analytic      = {:.10e}", check.analytic);
    println!("rel error     = {:.6e}", check.rel_error);
    check.verify(tol)?;
    Ok(())
}

fn materials_command() {
    println!(
        "{:<14} {:>12} {:>12} {:>8} {:>12} {:>8}",
        "name", "E11 [Pa]", "E22 [Pa]", "nu12", "G12 [Pa]", "nu21"
    );
    for material in CompositeMaterial::ALL {
        let p = material.properties();
        println!(
            "{:<14} {:>12.4e} {:>12.4e} {:>8.4} {:>12.4e} {:>8.4}",
            material.name(),
            p.e11,
            p.e22,
            p.nu12,
            p.g12,
            p.nu21()
        );
    }
}
