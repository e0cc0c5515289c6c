// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use clap::Parser;

use pose_goniometry::cli::{self, args::Cli};

fn main() {
    let args = Cli::parse();
    cli::run(&args);
}
