use clap::Parser;
use tracing::{error, info};

use quadfem::{mesher, post_processor, Result, Runner};

/// Linear static analysis of a plane quadrilateral mesh
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Problem definition json
    input: String,

    /// Where to write nodal results
    #[arg(long, default_value = "nodes.csv")]
    nodes_output: String,

    /// Where to write element connectivity
    #[arg(long, default_value = "elements.csv")]
    elements_output: String,

    /// Draw progress bars
    #[arg(long)]
    progress: bool,
}

fn run(args: &Args) -> Result<()> {
    let (geometry, metadata) = mesher::run(&args.input)?;

    let mut runner = Runner::with_geometry(geometry);
    runner
        .set_stress_state(metadata.stress_state)
        .show_progress(args.progress);

    runner.run_analysis(metadata.stiffness_integration, metadata.stress_integration)?;

    let max_displacement = runner
        .geometry
        .nodes
        .iter()
        .map(|n| n.ux.hypot(n.uy))
        .fold(0.0, f64::max);
    info!("maximum displacement magnitude {:e}", max_displacement);

    post_processor::csv_output(&runner.geometry, &args.nodes_output, &args.elements_output)
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if let Err(err) = run(&args) {
        error!("{err}");
        std::process::exit(1)
    }
}
