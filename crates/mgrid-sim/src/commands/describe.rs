use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use mgrid_engine::ParamInfo;
use serde_yaml::from_str;

use crate::plan::SweepPlan;

#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// YAML plan describing the grid.
    #[arg(long)]
    pub plan: PathBuf,
}

pub fn run(args: &DescribeArgs) -> Result<(), Box<dyn Error>> {
    let plan_text = fs::read_to_string(&args.plan)?;
    let plan: SweepPlan = from_str(&plan_text)?;
    let space = plan.space()?;
    let info = ParamInfo::describe(&space)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    println!(
        "{} points, shape {:?}, {} worker(s) planned",
        space.size(),
        space.shape(),
        plan.sweep.workers
    );
    Ok(())
}
