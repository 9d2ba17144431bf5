// src/main.rs

use std::io::{self, Stdout};
use std::panic;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, LeaveAlternateScreen},
};
use tracing::info;

use kryon_core::{load_krb_file, Document};
use kryon_ratatui::RatatuiBackend;
use kryon_render::RenderBackend;
use kryon_runtime::{window_config, KryonApp};
use ratatui::backend::CrosstermBackend;

#[derive(Parser)]
#[command(name = "kryon-renderer")]
#[command(about = "Terminal renderer for Kryon Binary (.krb) files")]
struct Args {
    /// Path to the .krb file to render
    krb_file: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Inspect KRB file contents without rendering
    #[arg(long)]
    inspect: bool,
}

const EXIT_PARSE_ERROR: u8 = 1;
const EXIT_BACKEND_ERROR: u8 = 2;

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = init_logging(args.debug) {
        eprintln!("failed to initialize logging: {error}");
        return ExitCode::from(EXIT_BACKEND_ERROR);
    }

    if !Path::new(&args.krb_file).exists() {
        eprintln!("KRB file not found: {}", args.krb_file);
        return ExitCode::from(EXIT_PARSE_ERROR);
    }

    // Parse errors exit with a single-line reason.
    let document = match load_krb_file(&args.krb_file) {
        Ok(document) => document,
        Err(error) => {
            eprintln!("{}: {}", args.krb_file, error);
            return ExitCode::from(EXIT_PARSE_ERROR);
        }
    };

    if args.inspect {
        inspect_document(&args.krb_file, &document);
        return ExitCode::SUCCESS;
    }

    // The terminal must be restored even when the render loop panics.
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = cleanup_terminal();
        original_hook(panic_info);
    }));

    let config = window_config(&document);
    let backend = match RatatuiBackend::<CrosstermBackend<Stdout>>::initialize(&config) {
        Ok(backend) => backend,
        Err(error) => {
            let _ = cleanup_terminal();
            eprintln!("renderer initialization failed: {error}");
            return ExitCode::from(EXIT_BACKEND_ERROR);
        }
    };

    info!("starting render loop (press 'q' to quit)");
    let result = KryonApp::new(document, backend).and_then(|mut app| app.run());

    if let Err(error) = cleanup_terminal() {
        eprintln!("failed to restore terminal: {error}");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("runtime error: {error:#}");
            ExitCode::from(EXIT_BACKEND_ERROR)
        }
    }
}

fn init_logging(debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")
}

fn cleanup_terminal() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(())
}

/// Prints what the decoder saw without entering the render loop. Useful
/// when a file renders as nothing.
fn inspect_document(path: &str, document: &Document) {
    println!("Inspecting {path}");
    let header = &document.header;
    println!(
        "  version {}.{}  flags {:#06x}  total size {}",
        header.version_major,
        header.version_minor,
        header.flags.bits(),
        header.total_size
    );
    println!(
        "  {} elements, {} styles, {} strings, {} resources, {} component templates",
        document.elements.len(),
        document.styles.len(),
        document.strings.len(),
        document.resources.len(),
        document.templates.len(),
    );

    println!("Strings:");
    for (index, string) in document.strings.iter().enumerate() {
        println!("  [{index}] {string:?}");
    }

    println!("Elements:");
    for (index, element) in document.elements.iter().enumerate() {
        let header = &element.header;
        println!(
            "  [{index}] {:?} at offset {}: pos=({},{}) size=({},{}) layout={:#04x} style={} props={} children={} events={}",
            header.element_type,
            document.element_offsets[index],
            header.pos_x,
            header.pos_y,
            header.width,
            header.height,
            header.layout,
            header.style_id,
            element.properties.len(),
            element.child_offsets.len(),
            element.events.len(),
        );
        if element.header.width == 0 && element.header.height == 0 {
            println!("       note: no explicit size; relies on layout sizing");
        }
    }

    for def in document.templates.iter() {
        println!("Component template {:?}: {} bytes", def.name, def.template.len());
    }
}
