/******************************************************************************
 * Copyright ContinuousC. Licensed under the "Elastic License 2.0".           *
 ******************************************************************************/

mod config;
mod error;
mod job;
mod runner;
mod table;

use std::{path::PathBuf, sync::Arc};

use chrono::Local;
use clap::Parser;
use tap::Pipe;

use config::{load_config, table_path, Overrides};
use error::{Error, Result};
use job::{GroupAggregation, Job, JobName, MeterDataAggregation, MeterForecastingAggregation};
use runner::Runner;
use table::Table;

#[derive(Parser, Clone)]
struct Args {
    /// Job to run, by name (case-insensitive).
    #[clap(long, env, default_value = "meter-data-pre-aggregation")]
    job: JobName,
    /// Job configuration (YAML). Defaults apply when omitted.
    #[clap(long, env)]
    config: Option<PathBuf>,
    /// Directory holding the table files.
    #[clap(long, env, default_value = ".")]
    data_dir: PathBuf,
    #[clap(flatten)]
    overrides: Overrides,
    /// Print the scan plan and exit.
    #[clap(long)]
    plan: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    env_logger::init();

    if let Err(e) = run(&args).await {
        log::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> Result<()> {
    let mut config = load_config(args.config.as_deref()).await?;
    args.overrides.apply(&mut config);

    log::info!("running {}", args.job);
    let today = Local::now().date_naive();
    match args.job {
        JobName::MeterData => execute(MeterDataAggregation::new(config, today)?, args).await,
        JobName::MeterForecasting => {
            execute(MeterForecastingAggregation::new(config, today)?, args).await
        }
    }
}

async fn execute<V>(job: GroupAggregation<V>, args: &Args) -> Result<()>
where
    GroupAggregation<V>: Job,
{
    if args.plan {
        let plan = serde_json::to_string_pretty(&job.scan_plan()).map_err(Error::SerializePlan)?;
        println!("{plan}");
        return Ok(());
    }

    let input_path = table_path(&args.data_dir, &job.config().input_table);
    let output_path = table_path(&args.data_dir, &job.config().output_table);
    let input = Table::load(&input_path).await?.pipe(Arc::new);
    let mut output = Table::load_or_new(&output_path).await?;

    let combine = job.config().combine;
    let (rows, counters) = Runner::new(job, combine).run(input).await?;
    log::info!("{counters}");

    rows.into_iter().for_each(|row| output.put(row));
    output.save(&output_path).await?;
    log::info!("wrote {} rows to {}", counters.output_rows, output_path.display());

    Ok(())
}
