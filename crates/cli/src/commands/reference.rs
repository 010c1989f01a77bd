//! Reference maintenance

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::output::{print_success, print_warning};
use routecheck_harness::snapshot::{regenerate, DefaultFilter, JourneyFilter, ResponseFilter};

#[derive(Args)]
pub struct RegenArgs {
    /// Reference files, or directories searched for `*.json`
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Use the journey filter instead of the default one
    #[arg(long)]
    pub journey: bool,
}

fn reference_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", path.display()))?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "json") {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Rewrite each reference's `response` from its `full_response`
pub fn regen(args: RegenArgs) -> Result<()> {
    let filter: Box<dyn ResponseFilter> = if args.journey {
        Box::new(JourneyFilter::default())
    } else {
        Box::new(DefaultFilter::default())
    };

    let mut total = 0;
    let mut changed = 0;
    for root in &args.paths {
        let files = reference_files(root)?;
        if files.is_empty() {
            print_warning(&format!("No reference found under {}", root.display()));
        }
        for file in files {
            total += 1;
            if regenerate(&file, filter.as_ref()).with_context(|| format!("regenerating {}", file.display()))? {
                changed += 1;
            }
        }
    }
    print_success(&format!("{changed} of {total} reference(s) regenerated"));
    Ok(())
}
