use std::env;
use std::path::Path;
use std::process::ExitCode;

use timepack::sim::{report, Machine};
use timepack::workload::{list_workloads, load_workload, TRACE_DIR};
use timepack::{Result, Tuning, WorkloadError};

const RESULTS_DIR: &str = "./results";

fn print_workloads() {
    println!("Workloads:");
    for name in list_workloads() {
        println!("\t{}", name);
    }
}

fn run(name: &str) -> Result<()> {
    let workload = load_workload(name)?;
    log::info!(
        "workload {}: {} cpus, time packing {}",
        name,
        workload.cpus,
        if workload.time_packer_active { "on" } else { "off" }
    );

    let mut machine = Machine::from_workload(&workload, Path::new(TRACE_DIR), Tuning::default())?;
    machine.run()?;

    let summary = report::build_summary(
        name,
        workload.time_packer_active,
        machine.procs(),
        machine.migrator(),
    );
    report::print_summary(&summary);
    let path = report::write_summary_json(&summary, Path::new(RESULTS_DIR))?;
    log::info!("results written to {}", path.display());

    Ok(())
}

fn main() -> ExitCode {
    timepack::logging::initialize_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        println!("Usage: timepack <WORKLOAD>");
        println!();
        print_workloads();
        return ExitCode::SUCCESS;
    }

    match run(&args[1]) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<WorkloadError>() {
            Some(WorkloadError::UnknownWorkload(name)) => {
                println!("Unrecognized workload: {}", name);
                println!();
                print_workloads();
                ExitCode::SUCCESS
            }
            _ => {
                log::error!("{}", e);
                ExitCode::FAILURE
            }
        },
    }
}
