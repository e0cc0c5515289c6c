// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use crate::cli::args::AnalyzeArgs;
use crate::pipeline::{Analyzer, MetricImages};
use crate::results::MetricResults;
use crate::utils::find_next_run_dir;
use crate::{AnalysisConfig, PoseModel, Result, VERSION};
use crate::{error, section, success, verbose, warn};

/// Run the analyze command and exit non-zero on failure.
pub fn run_analyze(args: &AnalyzeArgs) {
    crate::logging::set_verbose(args.verbose);
    if let Err(e) = analyze(args) {
        error!("{e}");
        process::exit(1);
    }
}

fn analyze(args: &AnalyzeArgs) -> Result<()> {
    let paths = args.images();
    if paths.is_empty() {
        warn!("No images given. Pass at least one of --ankle, --knee, --hip-flexion, --r1, --popliteal, --r2");
    }

    let mut images = MetricImages::new();
    for (metric, path) in &paths {
        images.insert(*metric, std::fs::read(path)?);
    }

    let model = PoseModel::load(&args.model)?;
    println!("Pose Goniometry {VERSION} 🚀 Rust ONNX CPU");
    verbose!(
        "{} summary: {} keypoints, imgsz=({}, {})",
        args.model,
        model.schema().len(),
        model.imgsz().0,
        model.imgsz().1
    );
    verbose!("");

    let config = AnalysisConfig::new()
        .with_min_keypoint_confidence(args.conf)
        .with_flip(args.flip)
        .with_annotate(cfg!(feature = "annotate"));
    let analyzer = Analyzer::new(Arc::new(model), config)?;

    let start = Instant::now();
    let results = if args.sequential {
        analyzer.process_request_sequential(&images, args.side)?
    } else {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(analyzer.process_request(images, args.side))?
    };

    section!("Results ({} side)", args.side);
    for result in &results {
        println!("{}", result.verbose());
    }
    println!(
        "{}/{} metrics measured in {:.1}ms",
        results.success_count(),
        results.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    if args.save {
        let dir = find_next_run_dir("runs/analyze", "analyze");
        save_images(&results, &dir)?;
        success!("Results saved to {}", dir.display());
    }

    if let Some(path) = &args.json {
        let json = serde_json::to_string_pretty(&results.to_response())
            .map_err(|e| crate::GoniometryError::IoError(format!("Failed to serialize results: {e}")))?;
        std::fs::write(path, json)?;
        success!("JSON written to {}", path.display());
    }
    Ok(())
}

fn save_images(results: &MetricResults, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for result in results {
        let path = dir.join(format!("{}.png", result.metric().key()));
        if result.save(&path)? {
            verbose!("Saved {}", path.display());
        }
    }
    Ok(())
}
