use clap::Parser;
use parable::runner::{find_test_files, format_failure, run_files, RunOptions};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "parable-tests")]
#[command(about = "Run .tests golden files against the bash parser")]
#[command(version)]
struct Cli {
    /// Test files or directories searched for *.tests
    #[arg(default_value = "tests")]
    paths: Vec<PathBuf>,

    /// Only run cases whose name or file path contains this text
    #[arg(short = 'f', long = "filter")]
    filter: Option<String>,

    /// Print every case, not only failures
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Seconds before a single case is abandoned
    #[arg(long = "timeout", default_value_t = 10)]
    timeout: u64,

    /// Output the report as JSON
    #[arg(long = "json")]
    json: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut files = Vec::new();
    for path in &cli.paths {
        if !path.exists() {
            eprintln!("Error: No such test file or directory: {}", path.display());
            std::process::exit(1);
        }
        match find_test_files(path) {
            Ok(found) => files.extend(found),
            Err(e) => {
                eprintln!("Error: Invalid test path: {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
    }

    let options = RunOptions {
        filter: cli.filter,
        timeout: Duration::from_secs(cli.timeout),
    };
    let report = run_files(&files, &options).await;

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: Cannot serialize report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        if cli.verbose {
            for result in &report.results {
                let status = if result.passed() { "PASS" } else { "FAIL" };
                println!("{} {}:{} {}", status, result.file, result.line, result.name);
            }
        }
        if report.failed > 0 {
            println!();
            println!("{}", "=".repeat(60));
            println!("FAILURES");
            println!("{}", "=".repeat(60));
            for failure in report.failures() {
                print!("{}", format_failure(failure));
            }
            println!();
        }
        println!("{}", report.summary());
    }

    // Abandoned workers must not hold the process open
    std::process::exit(if report.failed > 0 { 1 } else { 0 });
}
