// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::FlipPolicy;
use crate::metric::MetricId;
use crate::model::DEFAULT_MODEL;
use crate::pose::Side;

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Analyze Options:
    --model, -m <MODEL>    Path to ONNX pose model [default: yolo11n-pose.onnx]
    --side <SIDE>          Body side to measure: left or right [default: right]
    --ankle <IMAGE>        Ankle dorsiflexion image
    --knee <IMAGE>         Knee flexion-extension image
    --hip-flexion <IMAGE>  Hip flexion image
    --r1 <IMAGE>           Hamstring R1 image
    --popliteal <IMAGE>    Popliteal angle image
    --r2 <IMAGE>           Hamstring R2 image
    --conf <CONF>          Keypoint confidence threshold [default: 0.5]
    --flip <FLIP>          Horizontal flip policy: never, always or left [default: never]
    --save                 Save annotated images to runs/analyze
    --json <FILE>          Write the JSON response to a file
    --verbose              Show verbose output

Examples:
    pose-goniometry analyze --side right --knee knee.jpg --ankle ankle.jpg
    pose-goniometry analyze -m yolo11s-pose.onnx --side left --hip-flexion hip.jpg --save
    pose-goniometry analyze --r1 r1.jpg --r2 r2.jpg --json results.json
    pose-goniometry serve --port 8000 --cors-origin http://localhost:3000"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Measure joint angles from one image per metric
    Analyze(AnalyzeArgs),
    /// Run the HTTP server
    Serve(ServeArgs),
}

/// Arguments for the analyze command.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Path to ONNX pose model file
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Body side to measure (left or right)
    #[arg(long, default_value_t = Side::Right)]
    pub side: Side,

    /// Ankle dorsiflexion image
    #[arg(long)]
    pub ankle: Option<PathBuf>,

    /// Knee flexion-extension image
    #[arg(long)]
    pub knee: Option<PathBuf>,

    /// Hip flexion image
    #[arg(long)]
    pub hip_flexion: Option<PathBuf>,

    /// Hamstring R1 image
    #[arg(long)]
    pub r1: Option<PathBuf>,

    /// Popliteal angle image
    #[arg(long)]
    pub popliteal: Option<PathBuf>,

    /// Hamstring R2 image
    #[arg(long)]
    pub r2: Option<PathBuf>,

    /// Keypoint confidence threshold
    #[arg(long, default_value_t = 0.5)]
    pub conf: f32,

    /// Horizontal flip policy (never, always, left)
    #[arg(long, default_value_t = FlipPolicy::Never)]
    pub flip: FlipPolicy,

    /// Save annotated images to runs/analyze
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// Write the JSON response to this file
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Process metrics one after another instead of concurrently
    #[arg(long, default_value_t = false)]
    pub sequential: bool,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

impl AnalyzeArgs {
    /// Image paths given on the command line, in metric order.
    #[must_use]
    pub fn images(&self) -> Vec<(MetricId, &PathBuf)> {
        [
            (MetricId::AnkleDorsiflexion, &self.ankle),
            (MetricId::KneeFlexionExtension, &self.knee),
            (MetricId::HipFlexion, &self.hip_flexion),
            (MetricId::HamstringR1, &self.r1),
            (MetricId::PoplitealAngle, &self.popliteal),
            (MetricId::HamstringR2, &self.r2),
        ]
        .into_iter()
        .filter_map(|(metric, path)| path.as_ref().map(|p| (metric, p)))
        .collect()
    }
}

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to ONNX pose model file [env: `MODEL_PATH`]
    #[arg(short, long)]
    pub model: Option<String>,

    /// Port to listen on [env: `PORT`]
    #[arg(long)]
    pub port: Option<u16>,

    /// Keypoint confidence threshold
    #[arg(long, default_value_t = 0.5)]
    pub conf: f32,

    /// Horizontal flip policy (never, always, left)
    #[arg(long, default_value_t = FlipPolicy::Never)]
    pub flip: FlipPolicy,

    /// Allowed CORS origin, repeatable; any origin when unset [env: `CORS_ORIGINS`]
    #[arg(long = "cors-origin")]
    pub cors_origin: Vec<String>,
}
