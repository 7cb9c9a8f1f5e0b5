//! CLI for greedex — a stream filter from weakly random events to unbiased
//! digits.
//!
//! Reads whitespace-separated tokens from a file or stdin, feeds each one
//! through the extractor, and writes the emitted digits as they become
//! justified. Digits are printed as single characters up to base 36 and as
//! space-separated decimal values above that.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use greedex_core::{Error, Extractor, ExtractorConfig};

#[derive(Parser)]
#[command(name = "greedex")]
#[command(about = "greedex — extract unbiased random digits from an event stream")]
#[command(version = greedex_core::VERSION)]
struct Cli {
    /// Input file of whitespace-separated event tokens (default: stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file for extracted digits (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output base
    #[arg(short, long, default_value = "2")]
    base: u32,

    /// Estimate each event's probability before counting it, instead of
    /// after (the default counts the event first)
    #[arg(long)]
    post_recalc: bool,

    /// Withhold output until this many events have been observed
    #[arg(long, default_value = "0")]
    rev_block: u64,

    /// Withhold output until the observed stream holds this many digits of
    /// entropy
    #[arg(long, default_value = "0")]
    rev_entropy: f64,

    /// Soft-reset threshold in (0, 1]: bound internal fraction growth at the
    /// cost of at most this many digits of entropy per reset (0 = off)
    #[arg(long, default_value = "0")]
    rounding: f64,

    /// Persist frequency statistics to this file after every event
    #[arg(long)]
    save_stats: Option<PathBuf>,

    /// Seed frequency statistics from a previously saved file
    #[arg(long)]
    load_stats: Option<PathBuf>,

    /// Print an extraction summary to stderr when the input ends
    #[arg(long)]
    stats: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("greedex: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let config = ExtractorConfig {
        base: cli.base,
        pre_recalc: !cli.post_recalc,
        rev_block: cli.rev_block,
        rev_entropy: cli.rev_entropy,
        rounding: cli.rounding,
        save_stats: cli.save_stats,
        load_stats: cli.load_stats,
    };
    let mut extractor = Extractor::new(config)?;

    let reader: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let mut emitted = 0u64;
    for line in reader.lines() {
        let line = line?;
        for token in line.split_whitespace() {
            let digits = extractor.observe(token)?;
            emitted += digits.len() as u64;
            write_digits(&mut writer, &digits, cli.base)?;
        }
        // Keep downstream pipes fed while the input trickles in.
        writer.flush()?;
    }
    if emitted > 0 {
        writeln!(writer)?;
    }
    writer.flush()?;

    if cli.stats {
        eprintln!(
            "greedex: {} event(s), {} distinct, {emitted} digit(s) emitted, \
             {:.3} digit(s) of entropy observed, {:.3} held back",
            extractor.total_events(),
            extractor.distinct_events(),
            extractor.accumulated_entropy(),
            extractor.accumulated_entropy() - extractor.output_count() as f64,
        );
    }
    Ok(())
}

fn write_digits(writer: &mut dyn Write, digits: &[u32], base: u32) -> io::Result<()> {
    for &d in digits {
        if base <= 36 {
            // from_digit is defined for every digit below a radix <= 36.
            let c = char::from_digit(d, base).unwrap();
            write!(writer, "{c}")?;
        } else {
            write!(writer, "{d} ")?;
        }
    }
    Ok(())
}
