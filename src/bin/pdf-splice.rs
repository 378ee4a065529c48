//! PDF Splice CLI tool
//!
//! Merge PDFs, import images and manage watermarks and stamps.

use anyhow::{bail, Context as _, Result};
use clap::{Args, Parser, Subcommand};
use glob::glob;
use std::path::{Path, PathBuf};
use std::process;

use pdf_splice::context::load_context;
use pdf_splice::params::{apply_watermark_details, parse_import_details, parse_text_watermark_details};
use pdf_splice::pdf::{extract_metadata, import_images_to_file, merge_pdfs, read_image, MergeOptions};
use pdf_splice::watermark::{add_watermarks_to_file, has_watermarks, remove_watermarks_from_file, BatchReport};
use pdf_splice::Watermark;

/// PDF Splice - merge documents and manage watermarks
#[derive(Parser)]
#[command(name = "pdf-splice")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge numbered PDFs in order
    pdf-splice merge -o handout.pdf \"[0-9]*.pdf\"

    # Diagonal text watermark behind the page content
    pdf-splice watermark in.pdf -o out.pdf --text \"Draft\" -d \"op:0.4, s:0.8\"

    # Stamp page 1 of a letterhead on pages 1-3, replacing an older stamp
    pdf-splice stamp in.pdf -o out.pdf --pdf letterhead.pdf --donor-page 1 --pages 1-3 --update

    # Remove all watermarks and stamps
    pdf-splice remove in.pdf -o clean.pdf")]
struct Cli {
    /// Log debug details; RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge multiple PDF files into one
    Merge {
        /// Input PDF files (in order). Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Add a watermark drawn behind the page content
    Watermark(OverlayArgs),

    /// Add a stamp drawn over the page content
    Stamp(OverlayArgs),

    /// Remove watermarks and stamps
    Remove {
        /// Input PDF file
        input: PathBuf,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Pages to process, e.g. "1,3,5-7" (default: all)
        #[arg(long)]
        pages: Option<String>,
    },

    /// Report whether a PDF carries watermarks or stamps
    Detect {
        /// PDF file to inspect
        input: PathBuf,
    },

    /// Append JPEG images as new pages
    Import {
        /// JPEG files (in order). Supports glob patterns like "*.jpg"
        #[arg(required = true)]
        images: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Existing PDF to append to (default: start a new document)
        #[arg(long)]
        into: Option<PathBuf>,

        /// Import description, e.g. "f:A4L, pos:c, sc:0.8"
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

#[derive(Args)]
struct OverlayArgs {
    /// Input PDF file
    input: PathBuf,

    /// Output PDF file path
    #[arg(short, long)]
    output: PathBuf,

    /// Text to draw; "\n" separates lines
    #[arg(long, conflicts_with_all = ["pdf", "image"], required_unless_present_any = ["pdf", "image"])]
    text: Option<String>,

    /// PDF whose page is drawn
    #[arg(long, conflicts_with = "image")]
    pdf: Option<PathBuf>,

    /// Donor page for --pdf; 0 maps donor page i onto page i
    #[arg(long, default_value_t = 1)]
    donor_page: usize,

    /// JPEG image to draw
    #[arg(long)]
    image: Option<PathBuf>,

    /// Description, e.g. "rot:45, op:0.5, pos:bl, off:10 10"
    #[arg(short, long, default_value = "")]
    description: String,

    /// Pages to process, e.g. "1,3,5-7" (default: all)
    #[arg(long)]
    pages: Option<String>,

    /// Replace overlays applied earlier instead of adding another one
    #[arg(long)]
    update: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose > 0 { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Merge { inputs, output } => cmd_merge(inputs, output),
        Commands::Watermark(args) => cmd_overlay(args, false),
        Commands::Stamp(args) => cmd_overlay(args, true),
        Commands::Remove { input, output, pages } => cmd_remove(input, output, pages),
        Commands::Detect { input } => cmd_detect(input),
        Commands::Import { images, output, into, description } => cmd_import(images, output, into, description),
        Commands::Info { input } => cmd_info(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Expand glob patterns in input paths
fn expand_globs(patterns: Vec<String>) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        // Check if pattern contains glob characters
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = Vec::new();
            for entry in glob(&pattern)? {
                match entry {
                    Ok(path) => matched.push(path),
                    Err(e) => eprintln!("Warning: glob error for {}: {}", pattern, e),
                }
            }
            if matched.is_empty() {
                bail!("No files matched pattern: {}", pattern);
            }
            // Sort each pattern's matches; explicit argument order is kept
            matched.sort();
            paths.extend(matched);
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    Ok(paths)
}

/// Range ends above this are cut back to it
const MAX_PAGES: usize = 100_000;

/// Parse a page selection like "1,3,5-7"
fn parse_pages(spec: Option<&str>) -> Result<Vec<usize>> {
    let Some(spec) = spec else { return Ok(Vec::new()) };

    let mut pages = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((from, to)) => {
                let from: usize = from.trim().parse().with_context(|| format!("invalid page range: {}", part))?;
                let to: usize = to.trim().parse().with_context(|| format!("invalid page range: {}", part))?;
                if from == 0 || from > to || from > MAX_PAGES {
                    bail!("invalid page range: {}", part);
                }
                pages.extend(from..=to.min(MAX_PAGES));
            }
            None => {
                let page: usize = part.parse().with_context(|| format!("invalid page number: {}", part))?;
                if page == 0 {
                    bail!("page numbers start at 1");
                }
                if page > MAX_PAGES {
                    bail!("page {} is beyond the last supported page {}", page, MAX_PAGES);
                }
                pages.push(page);
            }
        }
    }
    Ok(pages)
}

fn require_input(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    eprintln!(
        "{} page(s) done, {} skipped, {} failed",
        report.succeeded.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for (page, err) in &report.failed {
        eprintln!("  page {}: {}", page, err);
    }
}

/// Merge multiple PDFs into one
fn cmd_merge(inputs: Vec<String>, output: PathBuf) -> Result<()> {
    let inputs = expand_globs(inputs)?;
    for path in &inputs {
        require_input(path)?;
    }

    eprintln!("Merging {} PDF files...", inputs.len());

    let options = MergeOptions {
        input_paths: inputs,
        output_path: output.clone(),
    };
    merge_pdfs(&options)?;

    eprintln!("Merged to: {}", output.display());
    Ok(())
}

/// Build the overlay from the command line arguments
fn build_watermark(args: &OverlayArgs, on_top: bool) -> Result<Watermark> {
    let wm = if let Some(text) = &args.text {
        parse_text_watermark_details(text, &args.description, on_top)?
    } else if let Some(pdf) = &args.pdf {
        let donor = load_context(pdf).with_context(|| format!("reading {}", pdf.display()))?;
        apply_watermark_details(Watermark::pdf(donor, args.donor_page, on_top), &args.description)?
    } else if let Some(image) = &args.image {
        let img = read_image(image).with_context(|| format!("reading {}", image.display()))?;
        apply_watermark_details(Watermark::image(img.xobject, img.width, img.height, on_top), &args.description)?
    } else {
        bail!("one of --text, --pdf or --image is required");
    };
    Ok(wm)
}

/// Add a watermark or stamp
fn cmd_overlay(args: OverlayArgs, on_top: bool) -> Result<()> {
    require_input(&args.input)?;
    let pages = parse_pages(args.pages.as_deref())?;

    let mut wm = build_watermark(&args, on_top)?;
    wm.update = args.update;

    eprintln!("Adding {}...", wm.mode_name());
    let report = add_watermarks_to_file(&args.input, &args.output, &pages, &mut wm)?;
    print_report(&report);

    eprintln!("Output: {}", args.output.display());
    if !report.is_success() {
        bail!("{} page(s) failed", report.failed.len());
    }
    Ok(())
}

/// Remove watermarks and stamps
fn cmd_remove(input: PathBuf, output: PathBuf, pages: Option<String>) -> Result<()> {
    require_input(&input)?;
    let pages = parse_pages(pages.as_deref())?;

    eprintln!("Removing watermarks...");
    let report = remove_watermarks_from_file(&input, &output, &pages)?;
    print_report(&report);

    eprintln!("Output: {}", output.display());
    Ok(())
}

/// Report whether a PDF is watermarked
fn cmd_detect(input: PathBuf) -> Result<()> {
    require_input(&input)?;

    if has_watermarks(&input)? {
        println!("{}: watermarked", input.display());
    } else {
        println!("{}: no watermarks", input.display());
    }
    Ok(())
}

/// Append images as pages
fn cmd_import(images: Vec<String>, output: PathBuf, into: Option<PathBuf>, description: String) -> Result<()> {
    let images = expand_globs(images)?;
    if let Some(pdf) = &into {
        require_input(pdf)?;
    }
    let imp = parse_import_details(&description)?;

    eprintln!("Importing {} image(s)...", images.len());
    import_images_to_file(into.as_deref(), &images, &output, &imp)?;

    eprintln!("Output: {}", output.display());
    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: PathBuf) -> Result<()> {
    require_input(&input)?;

    let metadata = extract_metadata(&input)?;

    println!("File: {}", input.display());
    println!("Version: {}", metadata.version);
    println!("Pages: {}", metadata.page_count);

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }
    println!("Watermarked: {}", if metadata.watermarked { "yes" } else { "no" });

    Ok(())
}
