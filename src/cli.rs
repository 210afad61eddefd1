use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "bazel-source-finder")]
#[command(version)]
#[command(about = "Index compiled Bazel jars and map classes back to their sources")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Bazel workspace root. Defaults to the current directory.
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    #[arg(long, global = true, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Filter used when RUST_LOG is unset, e.g. `debug`.
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Write the class metadata document for a set of jars.
    Extract {
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        #[arg(value_name = "JAR", required = true, num_args = 1..)]
        jars: Vec<PathBuf>,
    },
    /// Print the classpath resolved for the workspace.
    Classpath,
    /// Find the source of a class inside a source jar.
    Locate {
        source_jar: PathBuf,

        /// Fully qualified class name, e.g. `com.acme.Widget`.
        class_name: String,

        #[arg(long, value_name = "NAME")]
        symbol: Option<String>,
    },
    /// Resolve a class member through the workspace classpath.
    Definition {
        /// Fully qualified class name, e.g. `com.acme.Widget`.
        class_name: String,

        #[arg(long, value_name = "NAME")]
        symbol: Option<String>,
    },
    /// Print the current build version of the workspace.
    Version,
}
