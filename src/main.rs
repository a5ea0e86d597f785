use anyhow::{anyhow, bail, Context, Result};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use polyexec::backoff::Backoff;
use polyexec::config::Config;
use polyexec::images;
use polyexec::{Engine, ExecutionRequest};

/// Attempts per image for `--pull`
const PULL_ATTEMPTS: u32 = 3;

/// Exit code for requests the engine refuses (unknown language, bad usage)
const EXIT_CLIENT_ERROR: i32 = 2;

fn print_help() {
    println!(
        "\
polyexec v{}

Runs source code in a resource-capped container and prints its output.

USAGE:
    polyexec [OPTIONS] <LANGUAGE> <SOURCE_FILE>
    polyexec [OPTIONS] --request <FILE>
    polyexec [OPTIONS] --languages | --pull

ARGUMENTS:
    LANGUAGE       Language id or alias (see --languages)
    SOURCE_FILE    File holding the program's source code

OPTIONS:
    -c, --config <PATH>    TOML configuration file [default: built-in defaults]
        --stdin <FILE>     Feed FILE to the program's stdin ('-' reads our stdin)
        --timeout <SECS>   Request timeout (accepted; engine-wide ceilings apply)
        --request <FILE>   Read a JSON request {{language, code, stdin?, timeout?}}
        --json             Print the result as JSON {{stdout, stderr}}
        --languages        List supported languages and their images
        --pull             Pull every language image ahead of time
    -h, --help             Print this help message and exit
    -V, --version          Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG    Log level filter for tracing, written to stderr
                (e.g. debug, polyexec=info)

EXAMPLES:
    polyexec python hello.py
    echo 42 | polyexec --stdin - cpp main.cpp
    polyexec -c /etc/polyexec.toml --json --request job.json
    RUST_LOG=debug polyexec go main.go",
        env!("CARGO_PKG_VERSION"),
    );
}

#[derive(Debug, PartialEq)]
enum Action {
    Help,
    Version,
    Languages,
    Pull,
    Run(RunArgs),
}

#[derive(Debug, Default, PartialEq)]
struct RunArgs {
    language: Option<String>,
    source: Option<String>,
    request: Option<String>,
    stdin: Option<String>,
    timeout: Option<f64>,
    json: bool,
}

#[derive(Debug, PartialEq)]
struct Cli {
    config: Option<String>,
    action: Action,
}

fn parse_cli(args: impl IntoIterator<Item = String>) -> Result<Cli> {
    let mut args = args.into_iter();
    let mut config = None;
    let mut run = RunArgs::default();
    let mut positional = Vec::new();
    let mut action = None;

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .ok_or_else(|| anyhow!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--help" | "-h" => return Ok(Cli { config, action: Action::Help }),
            "--version" | "-V" => return Ok(Cli { config, action: Action::Version }),
            "--languages" => action = Some(Action::Languages),
            "--pull" => action = Some(Action::Pull),
            "--json" => run.json = true,
            "-c" | "--config" => config = Some(value(&arg)?),
            "--stdin" => run.stdin = Some(value(&arg)?),
            "--request" => run.request = Some(value(&arg)?),
            "--timeout" => {
                let raw = value(&arg)?;
                let secs: f64 = raw
                    .parse()
                    .map_err(|_| anyhow!("--timeout expects seconds, got '{raw}'"))?;
                run.timeout = Some(secs);
            }
            flag if flag.starts_with('-') && flag != "-" => bail!("Unknown option: {flag}"),
            _ => positional.push(arg.clone()),
        }
    }

    if let Some(action) = action {
        return Ok(Cli { config, action });
    }

    match (run.request.is_some(), positional.len()) {
        (true, 0) => {}
        (false, 2) => {
            run.source = positional.pop();
            run.language = positional.pop();
        }
        (true, _) => bail!("--request cannot be combined with <LANGUAGE> <SOURCE_FILE>"),
        (false, _) => bail!("Expected <LANGUAGE> <SOURCE_FILE> (see --help)"),
    }

    Ok(Cli {
        config,
        action: Action::Run(run),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match parse_cli(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("polyexec: {e}");
            std::process::exit(EXIT_CLIENT_ERROR);
        }
    };

    match cli.action {
        Action::Help => {
            print_help();
            return Ok(());
        }
        Action::Version => {
            println!("polyexec v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Logs go to stderr; stdout belongs to the program being run
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("polyexec=warn")),
        )
        .init();

    let config = Config::load_or_default(cli.config.as_deref())?;
    let engine = Engine::docker(&config);
    info!(
        "Sandbox: {} (cpu={}s, mem={}MB, staging in {})",
        engine.sandbox_description(),
        config.sandbox.cpu_time_limit_secs,
        config.sandbox.memory_limit_mb,
        config.sandbox.staging_dir.display()
    );

    match cli.action {
        Action::Languages => {
            for profile in engine.registry().profiles() {
                let kind = if profile.is_compiled() { "compiled" } else { "interpreted" };
                println!("{:<12} {:<12} {}", profile.id, kind, profile.image);
            }
            Ok(())
        }
        Action::Pull => {
            let reports =
                images::pull_all(&config.sandbox, engine.registry(), PULL_ATTEMPTS, Backoff::default())
                    .await;
            let mut failed = 0;
            for report in &reports {
                match &report.error {
                    None => println!("✓ {} ({})", report.image, report.languages.join(", ")),
                    Some(e) => {
                        failed += 1;
                        println!("✗ {}: {e}", report.image);
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} image(s) could not be pulled", reports.len());
            }
            Ok(())
        }
        Action::Run(run) => run_once(&engine, run).await,
        Action::Help | Action::Version => Ok(()),
    }
}

async fn run_once(engine: &Engine, run: RunArgs) -> Result<()> {
    let mut request = match (&run.request, &run.language, &run.source) {
        (Some(path), _, _) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Cannot read request {path}"))?;
            serde_json::from_str::<ExecutionRequest>(&raw)
                .with_context(|| format!("Invalid request document {path}"))?
        }
        (None, Some(language), Some(source)) => {
            let code = tokio::fs::read_to_string(source)
                .await
                .with_context(|| format!("Cannot read source file {source}"))?;
            ExecutionRequest::new(language.as_str(), code)
        }
        _ => bail!("Nothing to run"),
    };

    if let Some(ref path) = run.stdin {
        request.stdin = Some(read_input(path).await?);
    }
    if let Some(secs) = run.timeout {
        request.timeout = Some(secs);
    }

    let result = match engine.execute(&request).await {
        Ok(result) => result,
        Err(e) if e.is_client_error() => {
            eprintln!("polyexec: {e}");
            std::process::exit(EXIT_CLIENT_ERROR);
        }
        Err(e) => return Err(e.into()),
    };

    if run.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
    }
    Ok(())
}

async fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut input = String::new();
        tokio::io::stdin().read_to_string(&mut input).await?;
        return Ok(input);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Cannot read stdin file {path}"))
}
