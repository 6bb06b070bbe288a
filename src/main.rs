use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use pretsa_rs::engine::{ClosenessMode, Engine, EventRecord};
use pretsa_rs::io::csv as pretsa_csv;

struct Args {
    input: String,
    output: String,
    k: u32,
    t: f64,
    mode: ClosenessMode,
    dp: Option<(f64, f64)>,
    prev_dir: Option<String>,
    seed: u64,
}

fn parse_args() -> Args {
    let mut args: Vec<String> = env::args().collect();
    args.remove(0);

    let input = args.remove(0);
    let output = args.remove(0);
    let k: u32 = args.remove(0).parse().expect("k must be a positive integer");
    let t: f64 = args.remove(0).parse().expect("t must be a real number");
    let mode = match args.remove(0).as_str() {
        "standard-wasserstein" => ClosenessMode::StandardWasserstein,
        "stochastic" => ClosenessMode::Stochastic,
        other => panic!("unknown mode '{other}', expected 'standard-wasserstein' or 'stochastic'"),
    };

    let mut dp = None;
    let mut prev_dir = None;
    let mut seed = 0u64;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--dp" => {
                let epsilon: f64 = args[i + 1].parse().expect("epsilon must be a real number");
                dp = Some((epsilon, 0.0));
                i += 2;
            }
            "--prev-dir" => {
                prev_dir = Some(args[i + 1].clone());
                i += 2;
            }
            "--seed" => {
                seed = args[i + 1].parse().expect("seed must be an unsigned integer");
                i += 2;
            }
            other => panic!("unrecognized argument '{other}'"),
        }
    }

    Args { input, output, k, t, mode, dp, prev_dir, seed }
}

fn load_previous_logs(prev_dir: &Option<String>) -> Vec<Vec<EventRecord>> {
    let Some(dir) = prev_dir else {
        return Vec::new();
    };
    let mut logs = Vec::new();
    for entry in fs::read_dir(dir).expect("could not read previous-log directory") {
        let entry = entry.expect("could not read directory entry");
        let file = File::open(entry.path()).expect("could not open previous log");
        let events = pretsa_csv::read_events(BufReader::new(file)).expect("could not parse previous log");
        logs.push(events);
    }
    logs
}

fn main() {
    let args = parse_args();

    println!("Sanitizing {} -> {}", args.input, args.output);
    let time_start = Instant::now();

    let input_file = File::open(&args.input).expect("could not open input log");
    let events = pretsa_csv::read_events(BufReader::new(input_file)).expect("malformed input log");

    let previous_logs = load_previous_logs(&args.prev_dir);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}").expect("valid template"));
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message("pruning and redistributing");

    let mut engine = Engine::build(&events, args.seed).expect("could not build engine");
    let report = engine.sanitize(args.k, args.t, args.mode, args.dp, &previous_logs).expect("sanitization failed");
    let rows = engine.emit();
    spinner.finish_with_message("done");

    let output_file = File::create(&args.output).expect("could not create output log");
    pretsa_csv::write_events(BufWriter::new(output_file), &rows).expect("could not write output log");

    println!(
        "Redistributed {} case(s), accumulated edit distance {}, {} case(s) replaced by DP",
        report.redistributed_cases.len(),
        report.accumulated_distance,
        report.dp_removed_cases,
    );
    println!("Time elapsed is {}ms", time_start.elapsed().as_millis());
}
