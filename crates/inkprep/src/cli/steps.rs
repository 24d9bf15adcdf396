//! The `inkprep steps` command: list what a config may name.

use clap::Args;
use inkprep_core::StepRegistry;

/// Arguments for the `steps` command.
#[derive(Args, Debug)]
pub struct StepsArgs {
    /// Print the names as a JSON array
    #[arg(long)]
    pub json: bool,
}

/// Execute the steps command.
pub fn execute(args: StepsArgs) -> anyhow::Result<()> {
    let registry = StepRegistry::with_builtin_steps();
    let names: Vec<&str> = registry.names().collect();

    if args.json {
        println!("{}", serde_json::to_string(&names)?);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}
