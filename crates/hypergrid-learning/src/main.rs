//! CLI entry point for hyper-parameter search.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use hypergrid_learning::{
    CvScores, Distribution, FittedSearch, GridSearch, ModelKind, ModelPipeline,
    NestedCvResult, ParamDistributions, ParamGrid, ParamSet, ParamValue, PivotTable,
    RandomizedSearch, Scoring, Search, SearchConfig, SearchResults, SearchStage,
    cross_validate, nested_cross_validate, parse_assignment,
};
use hypergrid_processing::{Dataset, DatasetConfig, load_csv, train_test_split};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// CLI-compatible model enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliModel {
    /// Histogram gradient boosting
    Gbm,
    /// Regularized logistic regression
    Logreg,
}

impl From<CliModel> for ModelKind {
    fn from(cli: CliModel) -> Self {
        match cli {
            CliModel::Gbm => ModelKind::GradientBoosting,
            CliModel::Logreg => ModelKind::LogisticRegression,
        }
    }
}

/// CLI-compatible scoring enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliScoring {
    Accuracy,
    BalancedAccuracy,
    RocAuc,
    F1,
    NegLogLoss,
}

impl From<CliScoring> for Scoring {
    fn from(cli: CliScoring) -> Self {
        match cli {
            CliScoring::Accuracy => Scoring::Accuracy,
            CliScoring::BalancedAccuracy => Scoring::BalancedAccuracy,
            CliScoring::RocAuc => Scoring::RocAuc,
            CliScoring::F1 => Scoring::F1,
            CliScoring::NegLogLoss => Scoring::NegLogLoss,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "hypergrid",
    version,
    about = "Hyper-parameter search over tabular classification pipelines",
    long_about = "Tune a preprocessing + classifier pipeline on a local CSV file.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  RUST_LOG              Overrides --log-level (may be set in .env)\n\n\
                  EXAMPLES:\n  \
                  # Grid search over two boosting parameters\n  \
                  hypergrid grid -i credit.csv -p classifier__learning_rate=0.01,0.1,1 \\\n    \
                  -p classifier__max_leaf_nodes=3,10,30 --pivot classifier__learning_rate,classifier__max_leaf_nodes\n\n  \
                  # Randomized search with 20 draws\n  \
                  hypergrid random -i credit.csv --dist classifier__learning_rate=loguniform:0.01:10 --n-iter 20\n\n  \
                  # Nested cross-validation of the default grid\n  \
                  hypergrid nested -i credit.csv --model logreg"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Suppress progress output (only show warnings and the final result)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output a JSON report to stdout instead of tables
    ///
    /// Disables all logs so stdout holds only the report.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exhaustive search over explicit value lists
    Grid {
        #[command(flatten)]
        common: CommonArgs,

        /// Grid entry NAME=V1,V2,... (repeatable); defaults to a per-model grid
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUES")]
        params: Vec<String>,

        #[command(flatten)]
        report: ReportArgs,
    },
    /// Search over configurations sampled from distributions
    Random {
        #[command(flatten)]
        common: CommonArgs,

        /// Distribution NAME=KIND:ARGS (repeatable), e.g. classifier__C=loguniform:0.001:1000
        #[arg(short = 'd', long = "dist", value_name = "NAME=DIST")]
        dists: Vec<String>,

        /// Number of sampled configurations
        #[arg(long, default_value = "10")]
        n_iter: usize,

        #[command(flatten)]
        report: ReportArgs,
    },
    /// Nested cross-validation of a grid (or randomized) search
    Nested {
        #[command(flatten)]
        common: CommonArgs,

        /// Grid entry NAME=V1,V2,... (repeatable)
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUES")]
        params: Vec<String>,

        /// Distribution NAME=KIND:ARGS (repeatable); switches to randomized search
        #[arg(short = 'd', long = "dist", value_name = "NAME=DIST")]
        dists: Vec<String>,

        #[arg(long, default_value = "10")]
        n_iter: usize,

        /// Number of outer folds
        #[arg(long, default_value = "5")]
        outer_cv: usize,
    },
    /// Cross-validate a single configuration
    Cv {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Path to the CSV file
    #[arg(short, long)]
    input: PathBuf,

    /// Binary target column
    #[arg(short, long, default_value = "class")]
    target: String,

    /// Target label treated as the positive class
    ///
    /// Defaults to the lexicographically larger label
    #[arg(long)]
    positive_label: Option<String>,

    /// Column to ignore, e.g. a row identifier (repeatable)
    #[arg(long = "drop", value_name = "COLUMN")]
    drop_columns: Vec<String>,

    /// Classifier to tune
    #[arg(short, long, value_enum, default_value = "gbm")]
    model: CliModel,

    /// Fixed pipeline parameter NAME=VALUE applied before searching (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    fixed: Vec<String>,

    /// Number of cross-validation folds
    #[arg(long, default_value = "5")]
    cv: usize,

    /// Parallel workers (-1 for all cores)
    #[arg(long, default_value = "-1", allow_hyphen_values = true)]
    n_jobs: i32,

    /// Seed for the split, folds and sampling
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Share of rows held out for the final test score
    #[arg(long, default_value = "0.2")]
    test_size: f64,

    #[arg(long, value_enum, default_value = "accuracy")]
    scoring: CliScoring,

    /// Use plain instead of stratified folds and split
    #[arg(long)]
    no_stratify: bool,

    /// Also score each fold's training rows
    #[arg(long)]
    train_score: bool,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Print a mean-score table over two parameters: ROW,COL
    #[arg(long, value_name = "ROW,COL")]
    pivot: Option<String>,

    /// Only print the N best candidates
    #[arg(long)]
    top: Option<usize>,

    /// Write all candidates as CSV
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// JSON report printed with `--json`.
#[derive(Debug, Serialize)]
struct Report<'a> {
    command: &'static str,
    generated_at: DateTime<Utc>,
    input: &'a Path,
    model: ModelKind,
    scoring: Scoring,
    n_train: usize,
    n_test: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a SearchResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pivot: Option<PivotTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cv: Option<CvScores>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nested: Option<NestedCvResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_score: Option<f64>,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    // Load .env first so RUST_LOG from it reaches the filter
    dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.quiet, cli.json);

    match &cli.command {
        Command::Grid {
            common,
            params,
            report,
        } => {
            let session = Session::load(common)?;
            let grid = build_grid(params, common.model.into())?;
            let search = attach_progress(
                GridSearch::new(session.pipeline.clone(), grid, session.config.clone()).into(),
            );
            run_search_command(&cli, "grid", &session, search, report)
        }
        Command::Random {
            common,
            dists,
            n_iter,
            report,
        } => {
            let session = Session::load(common)?;
            let distributions = build_distributions(dists, common.model.into())?;
            let search = attach_progress(
                RandomizedSearch::new(
                    session.pipeline.clone(),
                    distributions,
                    *n_iter,
                    session.config.clone(),
                )
                .into(),
            );
            run_search_command(&cli, "random", &session, search, report)
        }
        Command::Nested {
            common,
            params,
            dists,
            n_iter,
            outer_cv,
        } => run_nested(&cli, common, params, dists, *n_iter, *outer_cv),
        Command::Cv { common } => run_cv(&cli, common),
    }
}

/// Everything the subcommands share: the loaded data, its split, the base
/// pipeline and the search configuration.
struct Session<'a> {
    args: &'a CommonArgs,
    dataset: Dataset,
    train: Dataset,
    test: Dataset,
    pipeline: ModelPipeline,
    config: SearchConfig,
}

impl<'a> Session<'a> {
    fn load(args: &'a CommonArgs) -> Result<Self> {
        if !args.input.exists() {
            return Err(anyhow!("Input file not found: {}", args.input.display()));
        }

        let mut builder = DatasetConfig::builder()
            .target_column(&args.target)
            .test_size(args.test_size)
            .stratify(!args.no_stratify)
            .random_seed(args.seed);
        if let Some(label) = &args.positive_label {
            builder = builder.positive_label(label);
        }
        for column in &args.drop_columns {
            builder = builder.drop_column(column);
        }
        let data_config = builder.build()?;

        info!("Loading dataset from: {}", args.input.display());
        let dataset = load_csv(&args.input, &data_config)
            .with_context(|| format!("failed to load {}", args.input.display()))?;
        let (negatives, positives) = dataset.class_counts();
        info!(
            "Loaded {} rows x {} features ({} '{}', {} '{}')",
            dataset.n_rows(),
            dataset.n_features(),
            negatives,
            dataset.class_labels().negative,
            positives,
            dataset.class_labels().positive
        );

        let (train, test) = train_test_split(
            &dataset,
            data_config.test_size,
            data_config.random_seed,
            data_config.stratify,
        )?;
        info!("Split into {} train / {} test rows", train.n_rows(), test.n_rows());

        let model: ModelKind = args.model.into();
        let mut pipeline = ModelPipeline::builder()
            .classifier_boxed(model.build())
            .build()?;
        let fixed = parse_fixed(&args.fixed)?;
        if !fixed.is_empty() {
            debug!("Fixed parameters: {}", fixed);
            pipeline.set_params(&fixed)?;
        }

        let config = SearchConfig::builder()
            .cv_folds(args.cv)
            .stratified(!args.no_stratify)
            .scoring(args.scoring.into())
            .n_jobs(args.n_jobs)
            .random_seed(args.seed)
            .return_train_score(args.train_score)
            .build()?;

        Ok(Self {
            args,
            dataset,
            train,
            test,
            pipeline,
            config,
        })
    }

    fn report(&self, command: &'static str) -> Report<'_> {
        Report {
            command,
            generated_at: Utc::now(),
            input: &self.args.input,
            model: self.args.model.into(),
            scoring: self.config.scoring,
            n_train: self.train.n_rows(),
            n_test: self.test.n_rows(),
            search: None,
            pivot: None,
            cv: None,
            nested: None,
            test_score: None,
        }
    }
}

fn parse_fixed(assignments: &[String]) -> Result<ParamSet> {
    let mut params = ParamSet::new();
    for text in assignments {
        let (name, value) = parse_assignment(text)?;
        params.insert(name, ParamValue::parse_literal(&value));
    }
    Ok(params)
}

/// Parse `NAME=V1,V2,...` entries, or fall back to a grid for `model`.
fn build_grid(entries: &[String], model: ModelKind) -> Result<ParamGrid> {
    if entries.is_empty() {
        info!("No --param given; using the default {} grid", model);
        return Ok(default_grid(model));
    }
    let mut grid = ParamGrid::new();
    for text in entries {
        let (name, values) = parse_assignment(text)?;
        let values: Vec<ParamValue> = values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ParamValue::parse_literal)
            .collect();
        grid = grid.add(name, values);
    }
    Ok(grid)
}

fn default_grid(model: ModelKind) -> ParamGrid {
    match model {
        ModelKind::GradientBoosting => ParamGrid::new()
            .add("classifier__learning_rate", [0.01, 0.1, 1.0])
            .add("classifier__max_leaf_nodes", [3i64, 10, 30]),
        ModelKind::LogisticRegression => ParamGrid::new()
            .add("classifier__C", [0.01, 0.1, 1.0, 10.0])
            .add("preprocessor__scale_numeric", [true, false]),
    }
}

/// Parse `NAME=KIND:ARGS` entries, or fall back to distributions for `model`.
fn build_distributions(entries: &[String], model: ModelKind) -> Result<ParamDistributions> {
    if entries.is_empty() {
        info!("No --dist given; using the default {} distributions", model);
        return Ok(default_distributions(model));
    }
    let mut distributions = ParamDistributions::new();
    for text in entries {
        let (name, spec) = parse_assignment(text)?;
        let distribution: Distribution = spec.parse()?;
        distributions = distributions.add(name, distribution);
    }
    Ok(distributions)
}

fn default_distributions(model: ModelKind) -> ParamDistributions {
    match model {
        ModelKind::GradientBoosting => ParamDistributions::new()
            .add(
                "classifier__learning_rate",
                Distribution::LogUniform {
                    low: 0.01,
                    high: 10.0,
                },
            )
            .add(
                "classifier__max_leaf_nodes",
                Distribution::IntUniform { low: 2, high: 256 },
            )
            .add(
                "classifier__min_samples_leaf",
                Distribution::IntUniform { low: 1, high: 100 },
            )
            .add(
                "classifier__max_bins",
                Distribution::IntUniform { low: 2, high: 255 },
            ),
        ModelKind::LogisticRegression => ParamDistributions::new()
            .add(
                "classifier__C",
                Distribution::LogUniform {
                    low: 0.001,
                    high: 1000.0,
                },
            )
            .add(
                "classifier__penalty",
                Distribution::Choice(vec!["l1".into(), "l2".into(), "elasticnet".into()]),
            )
            .add(
                "classifier__l1_ratio",
                Distribution::Uniform {
                    low: 0.0,
                    high: 1.0,
                },
            )
            .add(
                "classifier__solver",
                Distribution::Choice(vec!["proximal".into()]),
            ),
    }
}

/// Log stage changes; per-fit updates only at debug level.
fn attach_progress(search: Search) -> Search {
    let log = |update: hypergrid_learning::ProgressUpdate| {
        if update.fits_completed.is_some() {
            debug!("{:>3.0}% {}", update.progress * 100.0, update.message);
        } else if update.stage != SearchStage::Complete {
            info!("[{}] {}", update.stage.as_str(), update.message);
        }
    };
    match search {
        Search::Grid(s) => s.on_progress(log).into(),
        Search::Randomized(s) => s.on_progress(log).into(),
    }
}

fn run_search_command(
    cli: &Cli,
    command: &'static str,
    session: &Session<'_>,
    search: Search,
    report_args: &ReportArgs,
) -> Result<()> {
    info!("{}", "=".repeat(80));
    info!("Starting {} search...", command);
    info!("{}", "=".repeat(80));

    let FittedSearch {
        results,
        best_estimator,
        ..
    } = search.fit(&session.train)?;

    let pivot = match &report_args.pivot {
        Some(spec) => {
            let (row, col) = spec
                .split_once(',')
                .ok_or_else(|| anyhow!("--pivot expects ROW,COL, got '{}'", spec))?;
            Some(results.pivot(row.trim(), col.trim())?)
        }
        None => None,
    };

    if let Some(path) = &report_args.output {
        results
            .write_csv(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Results written to: {}", path.display());
    }

    let test_score = match &best_estimator {
        Some(best) => Some(best.score(&session.test, session.config.scoring)?),
        None => None,
    };

    if cli.json {
        let mut report = session.report(command);
        report.search = Some(&results);
        report.pivot = pivot;
        report.test_score = test_score;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match report_args.top {
        Some(n) => print_top(&results, n),
        None => println!("{}", results),
    }
    if let Some(pivot) = &pivot {
        println!("\nMean {} by parameter pair", session.config.scoring);
        println!("{}", pivot);
    }
    for warning in &results.warnings {
        println!("warning: {}", warning);
    }
    if let Some(score) = test_score {
        println!(
            "\nHeld-out {} of the refit best pipeline: {:.4}",
            session.config.scoring, score
        );
    }
    Ok(())
}

fn print_top(results: &SearchResults, n: usize) {
    println!("{:>4}  {:>9}  {:>8}  params", "rank", "mean_test", "std_test");
    for candidate in results.top(n) {
        println!(
            "{:>4}  {:>9.4}  {:>8.4}  {}",
            candidate.rank, candidate.mean_test_score, candidate.std_test_score, candidate.params
        );
    }
}

fn run_nested(
    cli: &Cli,
    common: &CommonArgs,
    params: &[String],
    dists: &[String],
    n_iter: usize,
    outer_cv: usize,
) -> Result<()> {
    if !params.is_empty() && !dists.is_empty() {
        bail!("use either --param (grid) or --dist (randomized), not both");
    }
    let session = Session::load(common)?;
    let model: ModelKind = common.model.into();

    let inner: Search = if dists.is_empty() {
        GridSearch::new(
            session.pipeline.clone(),
            build_grid(params, model)?,
            session.config.clone(),
        )
        .into()
    } else {
        RandomizedSearch::new(
            session.pipeline.clone(),
            build_distributions(dists, model)?,
            n_iter,
            session.config.clone(),
        )
        .into()
    };

    let mut outer = session.config.clone();
    outer.cv_folds = outer_cv;
    outer.refit = true;

    info!(
        "Nested cross-validation: {} outer x {} inner folds",
        outer.cv_folds, session.config.cv_folds
    );
    let result = nested_cross_validate(|_| inner.clone(), &session.dataset, &outer)?;

    if cli.json {
        let mut report = session.report("nested");
        report.nested = Some(result);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("{}", result);
    Ok(())
}

fn run_cv(cli: &Cli, common: &CommonArgs) -> Result<()> {
    let session = Session::load(common)?;
    let scores = cross_validate(&session.pipeline, &session.train, &session.config)?;

    let mut model = session.pipeline.clone();
    model.fit(&session.train)?;
    let test_score = model.score(&session.test, session.config.scoring)?;

    if cli.json {
        let mut report = session.report("cv");
        report.cv = Some(scores);
        report.test_score = Some(test_score);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Parameters: {}", session.pipeline.params());
    for (fold, score) in scores.test_scores.iter().enumerate() {
        println!("  fold {}: {:.4}", fold, score);
    }
    println!(
        "CV {}: {:.4} +/- {:.4}",
        session.config.scoring, scores.mean, scores.std
    );
    println!("Held-out {}: {:.4}", session.config.scoring, test_score);
    Ok(())
}
