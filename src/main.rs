use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use fmri_realign::logger;
use fmri_realign::realign_pipeline::{
    OutputTarget, RealignBrick, RealignOptionsBuilder, RealignOutputs,
};
use tracing::{error, info};

/// Rigid-body realignment of a 4D fMRI series.
///
/// Output paths accept `skip` to suppress that artifact.
#[derive(Debug, Parser)]
#[command(name = "fmri-realign", version, about)]
struct Args {
    /// Input 4D NIfTI file
    input: PathBuf,

    /// JSON file with realignment options; flags below override it
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Motion parameters text file
    #[arg(long, value_name = "PATH|skip")]
    params: Option<OutputTarget>,

    /// World-to-world matrix stack
    #[arg(long, value_name = "PATH|skip")]
    world_to_world: Option<OutputTarget>,

    /// Voxel-to-world matrix stack
    #[arg(long, value_name = "PATH|skip")]
    voxel_to_world: Option<OutputTarget>,

    #[arg(long)]
    quality: Option<f64>,

    /// Smoothing FWHM in mm
    #[arg(long, value_name = "MM")]
    fwhm: Option<f64>,

    /// Sample spacing in mm
    #[arg(long, value_name = "MM")]
    sep: Option<f64>,

    /// Register to the first volume only
    #[arg(long)]
    no_rtm: bool,

    /// Wrapped axes, e.g. `0,1,0`
    #[arg(long, value_name = "X,Y,Z", value_parser = parse_wrap)]
    wrap: Option<[bool; 3]>,

    /// B-spline interpolation degree
    #[arg(long, value_name = "N")]
    interp: Option<u8>,

    /// Resolve defaults and print them without running
    #[arg(long)]
    test: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn outputs(&self) -> RealignOutputs {
        RealignOutputs {
            params: self.params.clone().unwrap_or_default(),
            world_to_world: self.world_to_world.clone().unwrap_or_default(),
            voxel_to_world: self.voxel_to_world.clone().unwrap_or_default(),
        }
    }

    fn options(&self) -> anyhow::Result<RealignOptionsBuilder> {
        let from_file = match &self.options {
            Some(path) => RealignOptionsBuilder::from_json_file(path)
                .with_context(|| format!("loading options from {}", path.display()))?,
            None => RealignOptionsBuilder::default(),
        };

        let mut flags = RealignOptionsBuilder::default();
        if let Some(quality) = self.quality {
            flags = flags.quality(quality);
        }
        if let Some(fwhm) = self.fwhm {
            flags = flags.fwhm(fwhm);
        }
        if let Some(sep) = self.sep {
            flags = flags.sep(sep);
        }
        if self.no_rtm {
            flags = flags.rtm(false);
        }
        if let Some(wrap) = self.wrap {
            flags = flags.wrap(wrap);
        }
        if let Some(interp) = self.interp {
            flags = flags.interp(interp);
        }
        if self.test {
            flags = flags.test(true);
        }

        Ok(from_file.merge(flags))
    }
}

fn parse_wrap(value: &str) -> Result<[bool; 3], String> {
    let flags = value
        .split(',')
        .map(|part| match part.trim() {
            "1" | "true" | "y" => Ok(true),
            "0" | "false" | "n" => Ok(false),
            other => Err(format!("invalid wrap flag `{}`", other)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    <[bool; 3]>::try_from(flags)
        .map_err(|flags| format!("expected 3 wrap flags, got {}", flags.len()))
}

fn run(args: &Args) -> anyhow::Result<()> {
    let brick = RealignBrick::new();
    let run = brick
        .run(&args.input, &args.outputs(), args.options()?)
        .with_context(|| format!("realigning {}", args.input.display()))?;

    if let Some(estimate) = &run.estimate {
        info!(timepoints = estimate.len(), "Motion estimates written");
    }
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init(args.verbose);

    info!("Starting fmri-realign...");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Realignment failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
