//! # CLI Module - Command Line Interface for Headless Simulation Runs
//!
//! Three subcommands drive the core without a window:
//!
//! ## `run`
//!
//! Steps a chosen backend through a demo preset and reports throughput,
//! optionally dumping the final state to a binary snapshot file.
//!
//! ```bash
//! nbodysim-rs run --backend cpu-multi --demo 0 --steps 200 --bodies 4096
//! ```
//!
//! ## `devices`
//!
//! Lists the simulators the mediator would construct on this machine.
//!
//! ```bash
//! nbodysim-rs devices
//! ```
//!
//! ## `presets`
//!
//! Prints the demo preset table as JSON.
//!
//! ```bash
//! nbodysim-rs presets
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::worker::DeviceKind;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Backend selector exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    CpuSingle,
    CpuMulti,
    Gpu,
    GpuSecondary,
}

impl Backend {
    pub fn device_kind(self) -> DeviceKind {
        match self {
            Backend::CpuSingle => DeviceKind::CpuSingle,
            Backend::CpuMulti => DeviceKind::CpuMulti,
            Backend::Gpu => DeviceKind::GpuPrimary,
            Backend::GpuSecondary => DeviceKind::GpuSecondary,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Step a simulator headlessly and report throughput
    Run {
        /// Compute backend to run on
        #[arg(short = 'k', long, value_enum, default_value_t = Backend::CpuMulti)]
        backend: Backend,

        /// Demo preset index (0..10)
        #[arg(short, long, default_value_t = 0)]
        demo: usize,

        /// Number of integration steps to run
        #[arg(short, long, default_value_t = 100)]
        steps: u64,

        /// Number of bodies (GPU backends require a multiple of 256)
        #[arg(short, long, default_value_t = 4096)]
        bodies: usize,

        /// Write the final state to this snapshot file
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// List the compute devices available to the mediator
    Devices {
        /// Number of bodies used when probing the devices
        #[arg(short, long, default_value_t = 4096)]
        bodies: usize,
    },

    /// Print the demo preset table as JSON
    Presets,
}
