use std::path::PathBuf;

use cpuorb::bench::LockedCounter;
use cpuorb::config::HarnessConfig;
use cpuorb::models::AggregateTotals;
use cpuorb::report::{
    render_counter, render_json, render_partial, render_partial_json, render_run, run_workload,
    verify_against_sequential,
};
use cpuorb::{error, HarnessError, Result};
use tracing_subscriber::EnvFilter;

/// Command-line switches
#[derive(Debug, Default)]
struct Options {
    config_path: Option<PathBuf>,
    json: bool,
    verify: bool,
}

fn parse_options() -> Result<Options> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or_else(|| {
                    HarnessError::ConfigError("--config requires a path".to_string())
                })?;
                options.config_path = Some(PathBuf::from(path));
            }
            "--json" => options.json = true,
            "--verify" => options.verify = true,
            other => {
                return Err(HarnessError::ConfigError(format!(
                    "Unknown argument: {}",
                    other
                )))
            }
        }
    }

    Ok(options)
}

async fn run(options: &Options) -> Result<()> {
    let config = match &options.config_path {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    config.validate()?;

    if !options.json {
        println!("CPUORB Workload Benchmark");
        println!(
            "Workers: {}, Tasks per worker: {}, Intensity: {}\n",
            config.workload.num_workers, config.workload.tasks_per_worker, config.workload.intensity
        );
    }

    let summary = run_workload(config.workload.clone()).await?;
    if options.verify {
        verify_against_sequential(&summary)?;
    }

    let counter = LockedCounter::run(&config.counter).await?;
    if !counter.is_exact() {
        return Err(HarnessError::VerificationError(format!(
            "counter finished at {} after {} increments",
            counter.final_value, counter.increments
        )));
    }

    if options.json {
        println!("{}", render_json(&summary, &counter)?);
    } else {
        print!("{}", render_run(&summary));
        if options.verify {
            println!("Verified against sequential pass");
        }
        println!();
        print!("{}", render_counter(&counter));
    }

    Ok(())
}

/// Print the totals of a run cut short by the collection deadline
fn report_partial(options: &Options, received: usize, expected: usize, totals: &AggregateTotals) {
    if options.json {
        match render_partial_json(received, expected, totals) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", error::user_friendly_message(&e)),
        }
    } else {
        print!("{}", render_partial(received, expected, totals));
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = match parse_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", error::user_friendly_message(&e));
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&options).await {
        if let HarnessError::PartialCompletion {
            received,
            expected,
            totals,
        } = &e
        {
            report_partial(&options, *received, *expected, totals);
        }
        eprintln!("{}", error::user_friendly_message(&e));
        std::process::exit(if error::is_degraded(&e) { 2 } else { 1 });
    }
}
