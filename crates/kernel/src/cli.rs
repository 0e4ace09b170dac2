//! Command-line arguments for the `keystone` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::bootstrap::Invocation;

/// Boot a Keystone site.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Site configuration file.
    #[arg(long, short, env = "KEYSTONE_CONFIG", default_value = "site.toml")]
    pub config: PathBuf,

    /// Task to run instead of serving, followed by its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub task: Vec<String>,
}

impl Args {
    pub fn invocation(&self) -> Invocation {
        Invocation::from_args(self.task.clone())
    }
}
