use std::{
    process,
    time::{Duration, Instant},
};

use clap::{Parser as ClapParser, ValueEnum};
use log::{LevelFilter, debug};

use roast::{
    ClosureDefiner, VM, VMCreateInfo, Value, VmResult, compile, install, workload,
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Interpret,
    Jit,
    Both,
}

#[derive(ClapParser, Debug)]
#[command(author, version, about = "Runs the built-in workload", long_about = None)]
struct Cli {
    /// Execution engine(s) to run the workload on
    #[arg(long, value_enum, default_value_t = Mode::Both)]
    mode: Mode,

    /// Runs per task, after one warmup run
    #[arg(long, default_value_t = 20)]
    iterations: u32,

    /// Overrides RUST_LOG
    #[arg(long, help = "Log level (off, error, warn, info, debug, trace)")]
    log_level: Option<LevelFilter>,
}

struct Measurement {
    task: &'static str,
    result: Option<Value>,
    elapsed: Duration,
}

fn run(translated: bool, iterations: u32) -> VmResult<Vec<Measurement>> {
    let vm = VM::new(VMCreateInfo::default())?;
    let tasks = workload::define(&vm)?;
    if translated {
        for method in workload::bytecode_methods(&vm)? {
            let unit = compile(&method)?;
            install(&method, &ClosureDefiner, unit)?;
        }
    }

    let mut measurements = Vec::with_capacity(tasks.len());
    for task in &tasks {
        let mut result = task.run(&vm)?;
        let started = Instant::now();
        for _ in 0..iterations {
            result = task.run(&vm)?;
        }
        let elapsed = started.elapsed();
        debug!("{} x{iterations} in {elapsed:?}", task.name);
        measurements.push(Measurement {
            task: task.name,
            result,
            elapsed,
        });
    }
    Ok(measurements)
}

fn report(label: &str, measurements: &[Measurement], iterations: u32) {
    for measurement in measurements {
        let per_run = measurement.elapsed / iterations.max(1);
        println!(
            "{label:>9} {:<12} {:>14} {per_run:>12?}/run",
            measurement.task,
            format_value(measurement.result.as_ref()),
        );
    }
}

fn format_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::Int(value)) => value.to_string(),
        Some(Value::Long(value)) => value.to_string(),
        Some(Value::Float(value)) => value.to_string(),
        Some(Value::Double(value)) => value.to_string(),
        Some(other) => format!("{other:?}"),
        None => "void".to_owned(),
    }
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if let Some(level) = cli.log_level {
        logger.filter_level(level);
    }
    logger.init();

    let mut runs = Vec::new();
    if matches!(cli.mode, Mode::Interpret | Mode::Both) {
        runs.push(("interpret", false));
    }
    if matches!(cli.mode, Mode::Jit | Mode::Both) {
        runs.push(("jit", true));
    }

    let mut results: Vec<Vec<Measurement>> = Vec::new();
    for (label, translated) in runs {
        match run(translated, cli.iterations) {
            Ok(measurements) => {
                report(label, &measurements, cli.iterations);
                results.push(measurements);
            }
            Err(err) => {
                eprintln!("Error running workload ({label}): {err}");
                process::exit(1);
            }
        }
    }

    if let [interpreted, translated] = results.as_slice() {
        for (a, b) in interpreted.iter().zip(translated) {
            if a.result != b.result {
                eprintln!(
                    "{}: interpreted {:?} but translated {:?}",
                    a.task, a.result, b.result
                );
                process::exit(1);
            }
            let speedup = a.elapsed.as_secs_f64() / b.elapsed.as_secs_f64().max(f64::EPSILON);
            println!("{:>9} {:<12} {speedup:.2}x", "speedup", a.task);
        }
    }
}
