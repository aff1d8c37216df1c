//! Subcommand execution
//!
//! Inputs are read with tokio, the tool runs on the blocking pool, and the
//! artifact is written under its fixed name in the output directory.

use crate::cli::{Command, WatermarkArgs};
use crate::config::{Config, RenderEngine, RendererConfig};
use anyhow::{bail, Context};
use doctools_core::{
    card_sheet, compress_pdf, images_to_pdf, merge_state, pdf_to_images, rotate_pdf,
    split_state, validate_pdf, watermark_pdf, Admission, Artifact, CardSide, CardSlots,
    EmbeddedImageRenderer, PageRenderer, PageSizing, PdfInfo, PendingFile, RasterFormat,
    RotationMap, SplitMode, ToolError, ToolFileState, ToolKind, WatermarkOptions,
    WatermarkPosition,
};
use std::path::{Path, PathBuf};

/// What a subcommand produced
#[derive(Debug)]
pub enum Outcome {
    Written { path: PathBuf, size: usize },
    Info(PdfInfo),
}

async fn read_input(path: &Path) -> anyhow::Result<PendingFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(PendingFile::from_path(path, bytes))
}

async fn load_state(kind: ToolKind, paths: &[PathBuf]) -> anyhow::Result<ToolFileState> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_input(path).await?);
    }
    let mut state = ToolFileState::new(kind);
    let change = state.add_all(files)?;
    tracing::debug!(tool = kind.label(), queued = change.len, "files admitted");
    Ok(state)
}

/// Run a tool call on the blocking pool
async fn blocking<F>(job: F) -> anyhow::Result<Artifact>
where
    F: FnOnce() -> Result<Artifact, doctools_core::ToolError> + Send + 'static,
{
    let artifact = tokio::task::spawn_blocking(job)
        .await
        .context("Tool task panicked")??;
    Ok(artifact)
}

async fn write_artifact(dir: &Path, artifact: Artifact) -> anyhow::Result<Outcome> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(&artifact.filename);
    tokio::fs::write(&path, &artifact.bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), size = artifact.len(), "artifact written");
    Ok(Outcome::Written {
        path,
        size: artifact.len(),
    })
}

pub async fn run(command: Command, config: Config, output_dir: &Path) -> anyhow::Result<Outcome> {
    let artifact = match command {
        Command::Cards {
            front,
            back,
            copies,
        } => {
            let admission = Admission::image().with_max_bytes(config.limits.card_image_max_bytes());
            let mut slots = CardSlots::with_admission(admission);
            slots.set(CardSide::Front, read_input(&front).await?)?;
            slots.set(CardSide::Back, read_input(&back).await?)?;

            let mut layout = config.cards;
            if let Some(copies) = copies {
                layout.copies = copies;
            }
            blocking(move || card_sheet(&slots, &layout)).await?
        }

        Command::ImagesToPdf {
            images,
            match_image,
            margin,
        } => {
            let state = load_state(ToolKind::ImagesToPdf, &images).await?;
            let mut options = config.convert;
            if match_image {
                options.sizing = PageSizing::MatchImage;
            }
            if let Some(margin) = margin {
                options.margin = margin;
            }
            blocking(move || images_to_pdf(&state, &options)).await?
        }

        Command::Merge { files } => {
            let state = load_state(ToolKind::Merge, &files).await?;
            blocking(move || merge_state(&state)).await?
        }

        Command::Split { file, pages, each } => {
            let state = load_state(ToolKind::Split, &[file]).await?;
            let mode = if each {
                SplitMode::EachPage
            } else {
                SplitMode::Extract
            };
            blocking(move || split_state(&state, &pages, mode)).await?
        }

        Command::ToImages {
            file,
            png,
            quality,
            scale,
            engine,
        } => {
            let input = single_pdf(ToolKind::PdfToImages, &file).await?;
            let mut renderer_config = config.renderer;
            if let Some(engine) = engine {
                renderer_config.engine = engine;
            }
            let mut options = config.render;
            if png {
                options.format = RasterFormat::Png;
            }
            if let Some(quality) = quality {
                options.jpeg_quality = quality;
            }
            if let Some(scale) = scale {
                options.scale = scale;
            }
            blocking(move || {
                let renderer = page_renderer(&renderer_config)?;
                pdf_to_images(&input, &options, renderer.as_ref())
            })
            .await?
        }

        Command::Compress {
            file,
            quality,
            max_dimension,
            recompress,
        } => {
            let input = single_pdf(ToolKind::Compress, &file).await?;
            let mut options = config.compress;
            if let Some(quality) = quality {
                options.jpeg_quality = quality;
            }
            if let Some(max) = max_dimension {
                options.max_image_dimension = max;
            }
            options.recompress_images |= recompress;
            blocking(move || compress_pdf(&input, &options)).await?
        }

        Command::Rotate { file, all, pages } => {
            let input = single_pdf(ToolKind::Rotate, &file).await?;
            if all.is_none() && pages.is_empty() {
                bail!("Nothing to rotate: pass --all or --page");
            }
            let mut rotations = RotationMap::new();
            if let Some(delta) = all {
                let total = doctools_core::get_page_count(&input)?;
                rotations.rotate_all(delta, total);
            }
            for (page, delta) in pages {
                rotations.rotate_page(page - 1, delta);
            }
            blocking(move || rotate_pdf(&input, &rotations)).await?
        }

        Command::Watermark(args) => {
            let input = single_pdf(ToolKind::Watermark, &args.file).await?;
            let options = watermark_options(args, &config).await?;
            blocking(move || watermark_pdf(&input, &options)).await?
        }

        Command::Info { file } => {
            let input = single_pdf(ToolKind::Split, &file).await?;
            return Ok(Outcome::Info(validate_pdf(&input)?));
        }
    };

    write_artifact(output_dir, artifact).await
}

/// Rasteriser for `to-images`; `Auto` falls back to embedded images when
/// PDFium is not built in or its library does not load
fn page_renderer(config: &RendererConfig) -> Result<Box<dyn PageRenderer>, ToolError> {
    match config.engine {
        RenderEngine::Embedded => Ok(Box::new(EmbeddedImageRenderer)),
        #[cfg(feature = "pdfium")]
        engine => match doctools_core::PdfiumRenderer::bind(config.pdfium_library_dir.as_deref()) {
            Ok(renderer) => Ok(Box::new(renderer)),
            Err(e) if engine == RenderEngine::Auto => {
                tracing::warn!(error = %e, "pdfium unavailable, using embedded images");
                Ok(Box::new(EmbeddedImageRenderer))
            }
            Err(e) => Err(e),
        },
        #[cfg(not(feature = "pdfium"))]
        RenderEngine::Auto => Ok(Box::new(EmbeddedImageRenderer)),
        #[cfg(not(feature = "pdfium"))]
        RenderEngine::Pdfium => Err(ToolError::Operation(
            "this build has no pdfium support; rebuild with --features pdfium".into(),
        )),
    }
}

/// Read one PDF through the tool's admission rule
async fn single_pdf(kind: ToolKind, path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut state = load_state(kind, &[path.to_path_buf()]).await?;
    state.require_ready()?;
    let (file, _) = state.remove_at(0);
    file.map(|f| f.bytes).context("No document loaded")
}

async fn watermark_options(args: WatermarkArgs, config: &Config) -> anyhow::Result<WatermarkOptions> {
    let defaults = &config.watermark;
    let position = match args.position {
        Some(p) => p.parse::<WatermarkPosition>()?,
        None => defaults.position,
    };
    let opacity = args.opacity.unwrap_or(defaults.opacity);

    Ok(match (args.text, args.image) {
        (_, Some(image)) => WatermarkOptions::Image {
            image: read_input(&image).await?,
            opacity,
            position,
        },
        (Some(content), None) => WatermarkOptions::Text {
            content,
            font_size: args.font_size.unwrap_or(defaults.font_size),
            color: args.color.unwrap_or_else(|| defaults.color.clone()),
            opacity,
            position,
        },
        (None, None) => bail!("Pass --text or --image"),
    })
}
