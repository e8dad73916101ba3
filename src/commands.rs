use crate::cli::{Commands, EventOutput, ReportFormat, SimParams};
use crate::config::SimConfig;
use crate::error::{FaultschedError, FaultschedResult};
use crate::events::{ConsoleSink, EventSink, JsonLinesSink, NullSink};
use crate::metrics::Report;
use crate::simulation::Simulation;
use crate::types::PolicyKind;
use colored::*;
use std::time::Instant;

pub fn execute_command(command: Commands, debug: bool, verbose: bool) -> FaultschedResult<()> {
    match command {
        Commands::Run { params, policy, events, format } => {
            let mut config = params.resolve()?;
            if let Some(policy) = policy {
                config.policy = policy.into();
            }
            execute_run(config, events, format, debug, verbose)
        }
        Commands::Compare { params, format } => execute_compare(params, format, verbose),
        Commands::Config { params } => execute_config(params),
    }
}

fn execute_run(
    config: SimConfig,
    events: EventOutput,
    format: ReportFormat,
    debug: bool,
    verbose: bool,
) -> FaultschedResult<()> {
    config.validate()?;

    if format == ReportFormat::Text {
        println!("{} {} scheduler", "Simulating:".bright_green(), config.policy);
    }
    if debug {
        println!("{} {:?}", "DEBUG:".bright_yellow(), config);
        println!("{} event output: {}", "DEBUG:".bright_yellow(), events);
    }

    let sink: Box<dyn EventSink> = match events {
        EventOutput::Text => Box::new(ConsoleSink::new()),
        EventOutput::Json => Box::new(JsonLinesSink::stdout()),
        EventOutput::Off => Box::new(NullSink),
    };

    let started = Instant::now();
    let report = Simulation::new(config)?.with_boxed_sink(sink).run()?;
    let elapsed = started.elapsed();

    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => {
            print_report(&report, verbose);
            if verbose {
                println!("{} {:.2?}", "Wall time:".bright_blue(), elapsed);
            }
        }
    }
    Ok(())
}

fn execute_compare(params: SimParams, format: ReportFormat, verbose: bool) -> FaultschedResult<()> {
    let mut base = params.resolve()?;
    // One seed for every policy so they see the same random streams
    if base.seed.is_none() {
        base.seed = Some(rand::random());
    }
    base.validate()?;

    let reports = PolicyKind::ALL
        .iter()
        .map(|&policy| {
            log::info!("comparing policy {}", policy);
            let config = SimConfig { policy, ..base.clone() };
            Simulation::new(config)
                .map_err(FaultschedError::from)
                .and_then(|simulation| simulation.run())
        })
        .collect::<FaultschedResult<Vec<_>>>()?;

    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        ReportFormat::Text => {
            println!(
                "{} horizon {}, seed {}",
                "Comparing policies:".bright_green(),
                base.sim_duration,
                base.seed.unwrap_or_default()
            );
            println!();
            println!(
                "{:<20} {:>14} {:>14} {:>12} {:>10} {:>10}",
                "Policy".bold(),
                "Avg wait".bold(),
                "Availability".bold(),
                "MTTR".bold(),
                "Done".bold(),
                "Lost".bold()
            );
            for report in &reports {
                println!(
                    "{:<20} {:>14} {:>13.2}% {:>12} {:>10} {:>10}",
                    report.policy.to_string(),
                    or_na(report.average_wait),
                    report.availability,
                    or_na(report.mttr),
                    report.processes_completed,
                    report.processes_lost
                );
            }
            if verbose {
                println!();
                for report in &reports {
                    print_report(report, true);
                }
            }
        }
    }
    Ok(())
}

fn execute_config(params: SimParams) -> FaultschedResult<()> {
    let config = params.resolve()?;
    config.validate()?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn or_na(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}", v))
}

fn print_report(report: &Report, verbose: bool) {
    let rule = "=".repeat(40);
    println!();
    println!("{}", rule);
    println!("{}", format!("--- {} FINAL METRICS ---", report.policy).bold());
    println!("{}", rule);

    match report.average_wait {
        Some(wait) => println!("Average Waiting Time: {:.2}", wait),
        None => println!("Average Waiting Time: N/A (no process reached the CPU)"),
    }
    println!("System Availability: {:.2}%", report.availability);
    match report.mttr {
        Some(mttr) => println!("Mean Time To Recovery (MTTR): {:.2}", mttr),
        None => println!("Mean Time To Recovery (MTTR): N/A (no recovery measured)"),
    }

    if verbose {
        println!("{}", "-".repeat(40));
        println!("Processes admitted:  {}", report.processes_admitted);
        println!("Processes started:   {}", report.processes_started);
        println!("Processes completed: {}", report.processes_completed);
        println!("Processes lost:      {}", report.processes_lost);
        if report.policy.is_preemptive() {
            println!("Preemptions:         {}", report.preemptions);
        }
        println!("Catastrophes:        {}", report.catastrophes);
        println!("Restorations:        {}", report.restorations);
        println!("Total downtime:      {:.2}", report.total_downtime);
    }
    println!("{}", rule);
}
