use std::{fs, process};

use clap::Parser;
use storecop_cli::{App, CheckArgs, Command, GenerateArgs, SabotageArgs};
use storecop_core::ConsistencySummary;
use storecop_testgen::sabotage::{sabotage, sabotage_random};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = App::parse();
    match &app.command {
        Command::Check(args) => check(args),
        Command::Generate(args) => generate(args),
        Command::Sabotage(args) => sabotage_store(args),
    }
}

fn to_json(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        eprintln!("Failed to serialize output: {e}");
        process::exit(1);
    })
}

fn print_summary(args: &CheckArgs, summary: &ConsistencySummary) {
    println!("{summary}");
    if args.verbose {
        for description in &summary.descriptions {
            println!("  {description}");
        }
    }
    if let (false, Some(path)) = (summary.is_consistent(), &summary.report_path) {
        println!(
            "See '{}' for a detailed consistency report.",
            path.display()
        );
    }
}

fn check(args: &CheckArgs) {
    let config = args.config();
    match storecop_core::check(&args.dir, &config) {
        Ok(summary) => {
            if args.json {
                let result = serde_json::json!({
                    "dir": args.dir,
                    "ok": summary.is_consistent(),
                    "summary": summary,
                });
                println!("{}", to_json(&result));
            } else {
                print_summary(args, &summary);
            }
            if !summary.is_consistent() {
                process::exit(1);
            }
        }
        Err(incomplete) => {
            if args.json {
                let result = serde_json::json!({
                    "dir": args.dir,
                    "ok": false,
                    "error": incomplete.error.to_string(),
                    "summary": incomplete.partial,
                });
                println!("{}", to_json(&result));
            } else {
                eprintln!("Check of {} did not complete: {}", args.dir.display(), incomplete.error);
                print_summary(args, &incomplete.partial);
            }
            process::exit(1);
        }
    }
}

fn generate(args: &GenerateArgs) {
    fs::create_dir_all(&args.output_dir).unwrap_or_else(|e| {
        eprintln!("Failed to create output directory: {e}");
        process::exit(1);
    });

    let stores = storecop_testgen::generator::generate_stores(
        &args.output_dir,
        args.n_store,
        &args.params(),
        &args.layout(),
    )
    .unwrap_or_else(|e| {
        eprintln!("Failed to generate stores: {e}");
        process::exit(1);
    });

    for store in &stores {
        let path = args.output_dir.join(format!("{}.json", store.get_id()));
        let file = fs::File::create(&path).unwrap_or_else(|e| {
            eprintln!("Failed to create {}: {e}", path.display());
            process::exit(1);
        });
        serde_json::to_writer_pretty(file, store).unwrap_or_else(|e| {
            eprintln!("Failed to write {}: {e}", path.display());
            process::exit(1);
        });
    }

    println!(
        "Generated {} stores to {}",
        stores.len(),
        args.output_dir.display()
    );
}

fn sabotage_store(args: &SabotageArgs) {
    let outcome = match args.fault {
        Some(fault) => sabotage(&args.dir, fault.into()),
        None => sabotage_random(&args.dir, &mut rand::rng()),
    };
    let sabotaged = outcome.unwrap_or_else(|e| {
        eprintln!("Failed to sabotage {}: {e}", args.dir.display());
        process::exit(1);
    });

    if args.json {
        let result = serde_json::json!({
            "dir": args.dir,
            "fault": sabotaged.fault,
            "description": sabotaged.description,
        });
        println!("{}", to_json(&result));
    } else {
        println!("{}: {}", sabotaged.fault, sabotaged.description);
    }
}
