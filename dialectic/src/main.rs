//! Interactive driver for the dialectic register machine.
//!
//! `run` answers one question at a terminal, `replay` drives a session
//! from a scripted transcript, and `batch` pumps a set of questions
//! against prepared responses.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};

use dialectic::core::arena::ChangedContinuation;
use dialectic::core::budget::Budget;
use dialectic::core::oracle::NoBuiltins;
use dialectic::core::parse::parse_message;
use dialectic::driver::RunOutcome;
use dialectic::exit_codes;
use dialectic::io::cache::{FileCache, MemoryCache, NoCache};
use dialectic::io::config::load_config;
use dialectic::io::elicit::StdioElicitor;
use dialectic::io::multiplex::{Job, MapSource, pump};
use dialectic::io::script::ScriptElicitor;
use dialectic::logging;
use dialectic::session::{Caches, SessionOptions, run_session};

#[derive(Parser)]
#[command(
    name = "dialectic",
    version,
    about = "Interactive register machine for recursive question decomposition"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question interactively at the terminal.
    Run {
        /// The top-level question.
        question: String,
        /// Root budget, a power of ten; unlimited when omitted.
        #[arg(short, long)]
        budget: Option<u64>,
        /// Session config file.
        #[arg(long, default_value = ".dialectic/config.toml")]
        config: PathBuf,
        /// Persist response caches under this directory.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Disable response caching for this session.
        #[arg(long)]
        no_cache: bool,
    },
    /// Drive a session from a scripted transcript.
    Replay {
        /// The top-level question.
        question: String,
        /// Transcript with one response per line (`//` comments allowed).
        script: PathBuf,
        /// Root budget, a power of ten; unlimited when omitted.
        #[arg(short, long)]
        budget: Option<u64>,
    },
    /// Pump a batch of questions against prepared responses.
    Batch {
        /// File with one question per line.
        questions: PathBuf,
        /// JSON map from observation text to response.
        responses: PathBuf,
        /// Budget per question, a power of ten; unlimited when omitted.
        #[arg(short, long)]
        budget: Option<u64>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            let code = if err.downcast_ref::<ChangedContinuation>().is_some() {
                exit_codes::REWOUND
            } else {
                exit_codes::INVALID
            };
            eprintln!("{err:#}");
            std::process::exit(code);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            question,
            budget,
            config,
            cache_dir,
            no_cache,
        } => cmd_run(&question, budget, &config, cache_dir, no_cache),
        Command::Replay {
            question,
            script,
            budget,
        } => cmd_replay(&question, &script, budget),
        Command::Batch {
            questions,
            responses,
            budget,
        } => cmd_batch(&questions, &responses, budget),
    }
}

fn cmd_run(
    question: &str,
    budget: Option<u64>,
    config: &Path,
    cache_dir: Option<PathBuf>,
    no_cache: bool,
) -> Result<i32> {
    let mut cfg = load_config(config)?;
    if budget.is_some() {
        cfg.budget = budget;
        cfg.validate()?;
    }
    let options = SessionOptions {
        budget: cfg.effective_budget(),
        use_cache: cfg.use_cache && !no_cache,
        driver: cfg.driver_config(),
    };
    let mut elicitor = StdioElicitor;

    let outcome = if no_cache {
        let mut caches = Caches {
            implement: NoCache,
            translate: NoCache,
        };
        run_session(question, &options, &mut elicitor, &NoBuiltins, &mut caches)?
    } else if let Some(dir) = cache_dir {
        let mut caches = Caches {
            implement: FileCache::open(dir.join("implement.json"))?,
            translate: FileCache::open(dir.join("translate.json"))?,
        };
        run_session(question, &options, &mut elicitor, &NoBuiltins, &mut caches)?
    } else {
        let mut caches = Caches {
            implement: MemoryCache::new(),
            translate: MemoryCache::new(),
        };
        run_session(question, &options, &mut elicitor, &NoBuiltins, &mut caches)?
    };
    report(&outcome)
}

fn cmd_replay(question: &str, script: &Path, budget: Option<u64>) -> Result<i32> {
    let options = SessionOptions {
        budget: budget_from(budget)?,
        // A transcript is exact; memoization would skip its lines.
        use_cache: false,
        ..SessionOptions::default()
    };
    let mut elicitor = ScriptElicitor::from_path(script)?;
    let mut caches = Caches {
        implement: NoCache,
        translate: NoCache,
    };
    let outcome = run_session(question, &options, &mut elicitor, &NoBuiltins, &mut caches)?;
    report(&outcome)
}

fn cmd_batch(questions: &Path, responses: &Path, budget: Option<u64>) -> Result<i32> {
    let budget = budget_from(budget)?;
    let questions_raw = fs::read_to_string(questions)
        .with_context(|| format!("read {}", questions.display()))?;
    let responses_raw = fs::read_to_string(responses)
        .with_context(|| format!("read {}", responses.display()))?;
    let entries: HashMap<String, String> = serde_json::from_str(&responses_raw)
        .with_context(|| format!("parse {}", responses.display()))?;
    let mut source = MapSource::from_entries(entries);

    let mut jobs = Vec::new();
    for (i, line) in questions_raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let question = parse_message(line)
            .ok_or_else(|| anyhow!("malformed question on line {}", i + 1))?;
        jobs.push(Job::new(format!("q{}", i + 1), &question, budget));
    }

    let pass = pump(&mut jobs, &mut source, &NoBuiltins)?;
    for (id, outcome) in &pass.finished {
        println!("{id}: {}", outcome.value);
    }
    if pass.waiting > 0 {
        println!("{} question(s) still waiting for responses", pass.waiting);
        return Ok(exit_codes::INTERRUPTED);
    }
    Ok(exit_codes::OK)
}

fn budget_from(arg: Option<u64>) -> Result<Budget> {
    match arg {
        None => Ok(Budget::Unlimited),
        Some(n) => {
            let budget = Budget::Finite(n);
            if !budget.is_power_of_ten() {
                bail!("budget must be a power of ten, got {n}");
            }
            Ok(budget)
        }
    }
}

fn report(outcome: &RunOutcome) -> Result<i32> {
    println!("A: {}", outcome.value);
    println!("budget consumed: {}", outcome.budget_consumed);
    Ok(if outcome.interrupted {
        exit_codes::INTERRUPTED
    } else {
        exit_codes::OK
    })
}
