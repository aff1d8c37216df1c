//! Command-line arguments

use crate::config::RenderEngine;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "doctools")]
#[command(version, about = "ID-card sheets and everyday PDF tools")]
pub struct Args {
    /// Configuration file (defaults to ./doctools.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the output file
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print sheet of ID cards: fronts on page 1, backs on page 2
    Cards {
        #[arg(long)]
        front: PathBuf,
        #[arg(long)]
        back: PathBuf,
        /// Copies of each side
        #[arg(long)]
        copies: Option<usize>,
    },

    /// One PDF page per image, in argument order
    ImagesToPdf {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Size each page to its image instead of fitting onto A4
        #[arg(long)]
        match_image: bool,
        /// Margin around images on A4 pages, in points
        #[arg(long)]
        margin: Option<f64>,
    },

    /// Concatenate PDFs in argument order
    Merge {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Extract pages, e.g. --pages "1-3,5"
    Split {
        file: PathBuf,
        #[arg(short, long)]
        pages: String,
        /// One PDF per page, zipped
        #[arg(long)]
        each: bool,
    },

    /// Render every page to an image, zipped
    ToImages {
        file: PathBuf,
        #[arg(long)]
        png: bool,
        /// JPEG quality, 1-100
        #[arg(long)]
        quality: Option<u8>,
        #[arg(long)]
        scale: Option<f32>,
        /// Page rasteriser; overrides [renderer] engine
        #[arg(long, value_enum)]
        engine: Option<RenderEngine>,
    },

    Compress {
        file: PathBuf,
        /// JPEG quality for re-encoded images, 1-100
        #[arg(long)]
        quality: Option<u8>,
        /// Longest image side in pixels
        #[arg(long)]
        max_dimension: Option<u32>,
        /// Re-encode every image, not only oversized ones
        #[arg(long)]
        recompress: bool,
    },

    /// Rotate pages by multiples of 90 degrees
    Rotate {
        file: PathBuf,
        /// Rotation for every page
        #[arg(long, allow_hyphen_values = true)]
        all: Option<i32>,
        /// PAGE:DEGREES with a 1-based page, repeatable
        #[arg(long = "page", value_parser = parse_page_rotation, allow_hyphen_values = true)]
        pages: Vec<(u32, i32)>,
    },

    Watermark(WatermarkArgs),

    /// Show page count, version and metadata
    Info { file: PathBuf },
}

#[derive(ClapArgs, Debug)]
pub struct WatermarkArgs {
    pub file: PathBuf,
    #[arg(long, conflicts_with = "image", required_unless_present = "image")]
    pub text: Option<String>,
    #[arg(long)]
    pub image: Option<PathBuf>,
    #[arg(long)]
    pub font_size: Option<f64>,
    /// #RRGGBB
    #[arg(long)]
    pub color: Option<String>,
    /// 0.0 to 1.0
    #[arg(long)]
    pub opacity: Option<f64>,
    /// center, top-left, top-right, bottom-left or bottom-right
    #[arg(long)]
    pub position: Option<String>,
}

/// `PAGE:DEGREES`, e.g. `2:-90`
pub fn parse_page_rotation(s: &str) -> Result<(u32, i32), String> {
    let (page, degrees) = s
        .split_once(':')
        .ok_or_else(|| format!("expected PAGE:DEGREES, got '{}'", s))?;
    let page: u32 = page
        .trim()
        .parse()
        .map_err(|_| format!("invalid page number '{}'", page))?;
    if page == 0 {
        return Err("page numbers start at 1".to_string());
    }
    let degrees: i32 = degrees
        .trim()
        .parse()
        .map_err(|_| format!("invalid degrees '{}'", degrees))?;
    if degrees % 90 != 0 {
        return Err(format!("{} is not a multiple of 90", degrees));
    }
    Ok((page, degrees))
}
