extern crate clap;
extern crate failure;
extern crate likesim;
extern crate rand;
extern crate serde_json;
extern crate tracing;
extern crate tracing_subscriber;

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use likesim::config::Config;
use likesim::data::{read_records, train_test_split, user_based_split, write_records, MalformedPolicy};
use likesim::evaluation::evaluate;
use likesim::store::RatingStore;

#[derive(Parser)]
#[command(name = "likesim")]
#[command(about = "Predict held-out ratings from like-set similarity")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Skip malformed input lines instead of aborting
    #[arg(long, global = true)]
    skip_malformed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict every rating of a test file from a training file
    Evaluate {
        /// Training ratings (`user item rating` per line)
        training: PathBuf,

        /// Held-out ratings
        test: PathBuf,

        /// Number of similar users consulted
        #[arg(short = 'k', long)]
        neighbourhood_size: Option<usize>,

        /// Prediction threads
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Stop after this many test ratings
        #[arg(long)]
        limit: Option<usize>,

        /// Write every prediction to this CSV file
        #[arg(long)]
        records: Option<PathBuf>,

        /// Write the summary to this JSON file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Split one ratings file into training and test files
    Split {
        /// Ratings to split
        ratings: PathBuf,

        /// Fraction of ratings (or users, with --by-user) held out
        #[arg(long, default_value = "0.2")]
        test_fraction: f32,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Hold out whole users rather than individual ratings
        #[arg(long)]
        by_user: bool,

        /// Training output file
        #[arg(long, default_value = "train.data")]
        train_out: PathBuf,

        /// Test output file
        #[arg(long, default_value = "test.data")]
        test_out: PathBuf,
    },
}

fn run(cli: Cli) -> Result<(), failure::Error> {
    let mut config = match cli.config {
        Some(ref path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if cli.skip_malformed {
        config.malformed = MalformedPolicy::Skip;
    }

    match cli.command {
        Commands::Evaluate {
            training,
            test,
            neighbourhood_size,
            threads,
            limit,
            records,
            report,
        } => {
            if let Some(neighbourhood_size) = neighbourhood_size {
                config.predictor = config.predictor.neighbourhood_size(neighbourhood_size);
            }
            if threads.is_some() {
                config.evaluation.num_threads = threads;
            }
            if limit.is_some() {
                config.evaluation.limit = limit;
            }

            let (train, train_summary) =
                RatingStore::from_path(&training, config.scale, config.malformed)?;
            let (test, test_summary) = RatingStore::from_path(&test, config.scale, config.malformed)?;
            info!(
                training_users = train.num_users(),
                training_items = train.num_items(),
                training_ratings = train.num_ratings(),
                test_ratings = test.num_ratings(),
                "loaded"
            );

            let start = Instant::now();
            let predictor = config.predictor.clone().build(&train);
            predictor.precompute_neighbourhoods();
            let evaluation = evaluate(&predictor, &test, &config.evaluation)?;
            info!(elapsed = ?start.elapsed(), "evaluated");

            let malformed = train_summary.skipped.len() + test_summary.skipped.len();
            evaluation.write_summary(io::stdout().lock(), malformed)?;

            if let Some(path) = records {
                evaluation.write_records(BufWriter::new(File::create(&path)?))?;
                info!(path = %path.display(), "wrote prediction records");
            }
            if let Some(path) = report {
                serde_json::to_writer_pretty(File::create(&path)?, &evaluation.report())?;
                info!(path = %path.display(), "wrote report");
            }

            evaluation.statistics()?;
        }
        Commands::Split {
            ratings,
            test_fraction,
            seed,
            by_user,
            train_out,
            test_out,
        } => {
            let parsed = read_records(
                BufReader::new(File::open(&ratings)?),
                &config.scale,
                config.malformed,
            )?;
            let mut records = parsed.records;
            let mut rng = StdRng::seed_from_u64(seed);

            let (train, test) = if by_user {
                user_based_split(&records, &mut rng, test_fraction)
            } else {
                train_test_split(&mut records, &mut rng, test_fraction)
            };

            write_records(BufWriter::new(File::create(&train_out)?), &train)?;
            write_records(BufWriter::new(File::create(&test_out)?), &test)?;

            println!("Train: {}, test: {}", train.len(), test.len());
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(error) = run(Cli::parse()) {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }
}
