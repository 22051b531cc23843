use anyhow::Result;
use clap::{Parser, Subcommand};
use voxel_hpa::commands::{self, CommonOpts, WorldCommand};

#[derive(Parser, Debug)]
#[command(name = "voxel_hpa", version, about = "Hierarchical pathfinding over voxel occupancy grids")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a cluster hierarchy over a world and query it
    World {
        #[command(flatten)]
        common: CommonOpts,
        #[command(subcommand)]
        sub: WorldCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::World { common, sub } => commands::cmd_world(common, sub),
    }
}
