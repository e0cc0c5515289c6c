// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! CLI module.
//!
//! This module contains the command-line interface logic, including argument parsing,
//! the `analyze` command and the `serve` launcher.

/// Analyze command.
pub mod analyze;

/// CLI arguments.
pub mod args;

use args::{Cli, Commands, ServeArgs};

/// Dispatch a parsed command line.
pub fn run(cli: &Cli) {
    match &cli.command {
        Commands::Analyze(args) => analyze::run_analyze(args),
        Commands::Serve(args) => run_serve(args),
    }
}

#[cfg(feature = "server")]
fn run_serve(args: &ServeArgs) {
    let config = crate::AnalysisConfig::new()
        .with_min_keypoint_confidence(args.conf)
        .with_flip(args.flip);
    let server = crate::server::run(args.model.clone(), args.port, args.cors_origin.clone(), config);

    let outcome = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(crate::GoniometryError::from)
        .and_then(|runtime| runtime.block_on(server));
    if let Err(e) = outcome {
        crate::error!("{e}");
        std::process::exit(1);
    }
}

#[cfg(not(feature = "server"))]
fn run_serve(_args: &ServeArgs) {
    crate::error!("The 'serve' command requires the 'server' feature. Rebuild with '--features server'");
    std::process::exit(1);
}
