// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BIMDEX Indexer - B-rep post-processing of one federated model.
//!
//! Reads a JSON model (element meshes, optional world box and true north),
//! runs the processing pass and writes face records, element updates and
//! octree index rows as JSON lines.
//!
//! Pipeline settings come from `BIMDEX_*` environment variables; command
//! line flags override them.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use bimdex_processing::{IndexSelection, ModelProcessor, ModelSource, PipelineConfig};
use bimdex_spatial::IndexGeometry;
use clap::Parser;

mod jsonl;

use jsonl::JsonLinesSink;

#[derive(Parser, Debug)]
#[command(name = "bimdex-indexer")]
#[command(about = "Merges element faces, derives oriented boxes and builds the octree index of a BIM model")]
struct Args {
    /// Model JSON file
    input: PathBuf,

    /// Output JSON-lines file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Regenerate only these elements (comma separated ids)
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// JSON-lines output of an earlier run; its index rows are kept for
    /// elements not regenerated when its index frame still fits
    #[arg(long)]
    existing_index: Option<PathBuf>,

    /// Deepest octree level
    #[arg(long)]
    max_depth: Option<u8>,

    /// Geometry tested against octree cells: bbox or polyhedron
    #[arg(long)]
    geometry: Option<IndexGeometry>,

    /// Skip oriented bounding boxes
    #[arg(long)]
    no_obb: bool,

    /// Keep faces as read, without merging
    #[arg(long)]
    no_merge: bool,
}

impl Args {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::from_env();
        if let Some(depth) = self.max_depth {
            config.octree_max_depth = depth.clamp(1, bimdex_spatial::MAX_DEPTH);
        }
        if let Some(geometry) = self.geometry {
            config.index_geometry = geometry;
        }
        if self.no_obb {
            config.compute_obb = false;
        }
        if self.no_merge {
            config.merge_faces = false;
        }
        config
    }

    fn selection(&self) -> IndexSelection {
        if self.only.is_empty() {
            IndexSelection::All
        } else {
            IndexSelection::elements(self.only.iter().map(|s| s.trim().to_string()))
        }
    }
}

fn main() -> anyhow::Result<()> {
    // logs go to stderr, stdout may carry the records
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,bimdex=debug".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = args.config();
    let selection = args.selection();
    tracing::debug!(?config, "Loaded configuration");

    let json = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let mut model = ModelSource::from_json(&json)
        .with_context(|| format!("parsing {}", args.input.display()))?;

    let out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut sink = JsonLinesSink::new(BufWriter::new(out));
    if let Some(path) = &args.existing_index {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        sink = sink.with_existing_index(BufReader::new(file))?;
    }

    let report = ModelProcessor::new(config)
        .process(&mut model, &mut sink, &selection)
        .context("model pass failed")?;

    sink.into_inner().flush()?;

    tracing::info!(
        processed = report.elements_processed,
        skipped = report.elements_skipped,
        face_records = report.face_records,
        index_rows = report.index_rows,
        diagnostics = report.diagnostics.len(),
        "Done"
    );
    Ok(())
}
