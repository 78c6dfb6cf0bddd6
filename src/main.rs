mod error;
mod logging;
mod sim;
mod task_queue;
mod types;
mod worker_pool;

use std::str::FromStr;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Clone, Copy, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
enum Command {
    Demo,
    Bench,
    Stress,
}

fn parse_usize_list(arg: &str) -> Option<Vec<usize>> {
    if arg == "-" {
        return None;
    }
    let mut values = Vec::new();
    for part in arg.split(',') {
        if part.trim().is_empty() {
            return None;
        }
        let value = part.trim().parse::<usize>().ok()?;
        values.push(value);
    }
    Some(values)
}

fn print_usage(program: &str) {
    let commands = Command::iter()
        .map(|c| c.to_string())
        .collect::<Vec<String>>()
        .join(", ");
    println!("taskpool CLI");
    println!("Usage:");
    println!("  {program} (run demo)");
    println!("  {program} bench [workers] [tasks_per_producer] [producers] [work_ms] [validate] [failing]");
    println!("  {program} stress [worker_sets] [task_sets] [producer_sets] [work_ms] [validate] [failing]");
    println!("  {program} --help");
    println!();
    println!("Commands: {commands}");
    println!("Sets are comma-separated lists (e.g., 1,2,4). Use \"-\" to keep defaults for worker/task/producer sets.");
    println!("Omit work_ms to keep its default.");
    println!("Defaults:");
    println!("  demo   workers=5 tasks=10 (one task fails on purpose)");
    println!("  bench  workers=4 tasks_per_producer=25 producers=2 work_ms=5");
    println!("  stress workers=1,2,4,8 tasks_per_producer=10,25,50 producers=1,2,4 work_ms=5");
    println!("Flags:");
    println!("  validate  enable extra safety checks");
    println!("  failing   inject task failures to exercise isolation");
}

fn exit_with_usage(program: &str, message: &str) -> ! {
    eprintln!("{message}");
    print_usage(program);
    std::process::exit(2);
}

fn run_bench_command(args: impl Iterator<Item = String>) {
    let mut args = args;
    let workers = args.next().and_then(|v| v.parse::<usize>().ok());
    let tasks_per_producer = args.next().and_then(|v| v.parse::<usize>().ok());
    let producers = args.next().and_then(|v| v.parse::<usize>().ok());
    let work_ms = args.next().and_then(|v| v.parse::<u64>().ok());
    let mut validate = false;
    let mut inject_failures = false;
    for arg in args {
        match arg.as_str() {
            "validate" => validate = true,
            "failing" => inject_failures = true,
            _ => {}
        }
    }
    sim::run_benchmark(
        workers,
        tasks_per_producer,
        producers,
        work_ms,
        validate,
        inject_failures,
    );
}

fn run_stress_command(program: &str, args: impl Iterator<Item = String>) {
    let mut worker_sets: Option<Vec<usize>> = None;
    let mut task_sets: Option<Vec<usize>> = None;
    let mut producer_sets: Option<Vec<usize>> = None;
    let mut work_ms: Option<u64> = None;
    let mut worker_sets_skipped = false;
    let mut task_sets_skipped = false;
    let mut producer_sets_skipped = false;
    let mut validate = false;
    let mut inject_failures = false;

    for arg in args {
        match arg.as_str() {
            "validate" => {
                validate = true;
                continue;
            }
            "failing" => {
                inject_failures = true;
                continue;
            }
            _ => {}
        }

        if worker_sets.is_none() && !worker_sets_skipped {
            if arg == "-" {
                worker_sets_skipped = true;
            } else if let Some(values) = parse_usize_list(&arg) {
                worker_sets = Some(values);
            } else {
                exit_with_usage(program, &format!("stress: invalid worker_sets value: {arg}"));
            }
            continue;
        }
        if task_sets.is_none() && !task_sets_skipped {
            if arg == "-" {
                task_sets_skipped = true;
            } else if let Some(values) = parse_usize_list(&arg) {
                task_sets = Some(values);
            } else {
                exit_with_usage(program, &format!("stress: invalid task_sets value: {arg}"));
            }
            continue;
        }
        if producer_sets.is_none() && !producer_sets_skipped {
            if arg == "-" {
                producer_sets_skipped = true;
            } else if let Some(values) = parse_usize_list(&arg) {
                producer_sets = Some(values);
            } else {
                exit_with_usage(
                    program,
                    &format!("stress: invalid producer_sets value: {arg}"),
                );
            }
            continue;
        }
        if work_ms.is_none() {
            if let Ok(value) = arg.parse::<u64>() {
                work_ms = Some(value);
            } else {
                exit_with_usage(program, &format!("stress: invalid work_ms value: {arg}"));
            }
            continue;
        }

        exit_with_usage(program, &format!("stress: unexpected argument: {arg}"));
    }

    sim::run_stress(
        worker_sets,
        task_sets,
        producer_sets,
        work_ms,
        validate,
        inject_failures,
    );
}

fn main() {
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "taskpool".to_string());
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None => sim::run_demo(),
        Some("--help") | Some("-h") | Some("help") => print_usage(&program),
        Some(selector) => match Command::from_str(selector) {
            Ok(Command::Demo) => sim::run_demo(),
            Ok(Command::Bench) => run_bench_command(args),
            Ok(Command::Stress) => run_stress_command(&program, args),
            Err(_) => exit_with_usage(&program, &format!("unknown command: {selector}")),
        },
    }
}
