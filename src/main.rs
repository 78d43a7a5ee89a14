use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

use banking_etl::config::Config;
use banking_etl::domain::QualityTable;
use banking_etl::observability::logging;
use banking_etl::pipeline::runner::PipelineRunner;
use banking_etl::utils::generate_batch_id;

#[derive(Parser)]
#[command(name = "banking_etl")]
#[command(about = "Banking transactions warehouse ETL pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Batch id for this invocation; generated when absent. The scheduler
    /// passes the same id to every stage of one run.
    #[arg(long, global = true)]
    batch_id: Option<String>,

    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the source file into the raw staging table
    Extract {
        /// Source file; overrides the configured input path
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Cleanse pending raw records into typed cleaned records
    Transform,
    /// Resolve dimension keys and load fact rows
    Load,
    /// Compute and persist quality metrics for one table
    QualityCheck {
        /// Table to assess: raw, cleaned, or fact
        #[arg(long, default_value = "fact")]
        table: String,
    },
    /// Run extract, transform, load, and quality checks sequentially
    Run {
        /// Source file; overrides the configured input path
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    let batch_id = cli.batch_id.unwrap_or_else(generate_batch_id);

    match cli.command {
        Commands::Extract { input } => {
            if let Some(input) = input {
                config.etl.input_path = input;
            }
            let runner = PipelineRunner::new(config);
            let outcome = runner.run_extract(&batch_id)?;
            println!("✅ Extract complete for batch {}", batch_id);
            println!("   Rows extracted: {}", outcome.rows_extracted);
            println!("   Rows staged:    {}", outcome.rows_staged);
        }
        Commands::Transform => {
            let runner = PipelineRunner::new(config);
            let outcome = runner.run_transform(&batch_id)?;
            println!("✅ Transform complete for batch {}", batch_id);
            println!("   Rows cleaned:  {}", outcome.rows_cleaned);
            println!("   Rows rejected: {}", outcome.rows_rejected);
        }
        Commands::Load => {
            let runner = PipelineRunner::new(config);
            let outcome = runner.run_load(&batch_id)?;
            println!("✅ Load complete for batch {}", batch_id);
            println!("   Rows loaded: {}", outcome.rows_loaded);
            println!("   Duplicates:  {}", outcome.duplicates);
            println!("   Rows failed: {}", outcome.rows_failed);
        }
        Commands::QualityCheck { table } => {
            let Some(table) = QualityTable::parse(&table) else {
                error!("Unknown quality table: {}", table);
                anyhow::bail!("unknown quality table '{}' (expected raw, cleaned, or fact)", table);
            };
            let runner = PipelineRunner::new(config);
            let report = runner.run_quality(&batch_id, table)?;
            println!(
                "{} Quality status for {}: {}",
                if report.pass { "✅" } else { "⚠️" },
                table.table_name(),
                report.overall
            );
            for metric in &report.metrics {
                println!(
                    "   {:<24} {:>10.2} ({}%) [{}]",
                    metric.metric_name,
                    metric.value,
                    metric.percentage.unwrap_or(0.0),
                    metric.status
                );
            }
        }
        Commands::Run { input } => {
            if let Some(input) = input {
                config.etl.input_path = input;
            }
            let runner = PipelineRunner::new(config);
            let summary = runner.run(&batch_id)?;
            println!("\n📊 Pipeline results for batch {}:", summary.batch_id);
            println!("   Rows extracted:   {}", summary.rows_extracted);
            println!("   Rows transformed: {}", summary.rows_transformed);
            println!("   Rows loaded:      {}", summary.rows_loaded);
            println!("   Rows rejected:    {}", summary.rows_rejected);
            println!("   Duplicates:       {}", summary.duplicates);
            println!(
                "   Quality status:   {}",
                if summary.quality_pass { "PASS" } else { "FAIL" }
            );
        }
    }

    Ok(())
}
