use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use strata_pdf::parser::{ParseOptions, PdfDocument, PdfObject};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "stratapdf",
    about = "Inspect the structure of PDF files",
    version,
    author
)]
struct Cli {
    /// Log parser diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Fail on recoverable anomalies instead of working around them
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version, page count and document information
    Info {
        /// Input PDF file
        input: PathBuf,
    },

    /// List pages with their size and rotation
    Pages {
        /// Input PDF file
        input: PathBuf,
    },

    /// Print an indirect object
    Object {
        /// Input PDF file
        input: PathBuf,

        /// Object number
        number: u32,
    },

    /// Decode a stream object
    Stream {
        /// Input PDF file
        input: PathBuf,

        /// Object number of the stream
        number: u32,

        /// Write the decoded bytes here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "strata_pdf=debug,stratapdf=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open(input: &Path, strict: bool) -> Result<PdfDocument> {
    let options = if strict {
        ParseOptions::strict()
    } else {
        ParseOptions::default()
    };
    PdfDocument::open_with_options(input, options)
        .with_context(|| format!("failed to open {}", input.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Info { input } => {
            let document = open(&input, cli.strict)?;
            let metadata = document.metadata()?;

            println!("PDF Information for: {}", input.display());
            println!("==========================================");
            println!("PDF Version: {}", metadata.version);
            println!("Pages: {}", metadata.page_count);

            let xref = document.xref()?;
            println!("Objects: {}", xref.size().map_or(xref.len(), |size| size as usize));
            println!("Cross-reference sections: {}", xref.sections().len());

            let fields = [
                ("Title", &metadata.title),
                ("Author", &metadata.author),
                ("Subject", &metadata.subject),
                ("Keywords", &metadata.keywords),
                ("Creator", &metadata.creator),
                ("Producer", &metadata.producer),
            ];
            for (label, value) in fields {
                if let Some(value) = value {
                    println!("{label}: {value}");
                }
            }
            if let Some(date) = metadata.creation_date {
                println!("Created: {}", date.to_rfc3339());
            }
            if let Some(date) = metadata.modification_date {
                println!("Modified: {}", date.to_rfc3339());
            }
        }

        Commands::Pages { input } => {
            let document = open(&input, cli.strict)?;
            for page in document.pages() {
                println!(
                    "Page {}: {} x {} pt, rotation {}, object {} {}",
                    page.number,
                    page.width(),
                    page.height(),
                    page.rotation,
                    page.obj_ref.0,
                    page.obj_ref.1
                );
            }
        }

        Commands::Object { input, number } => {
            let document = open(&input, cli.strict)?;
            match document.get_object(number)? {
                PdfObject::Stream(stream) => {
                    println!("{}", PdfObject::Dictionary(stream.dict.clone()));
                    println!("stream ({} bytes)", stream.data.len());
                }
                object => println!("{object}"),
            }
        }

        Commands::Stream {
            input,
            number,
            output,
        } => {
            let document = open(&input, cli.strict)?;
            let object = document.get_object(number)?;
            let Some(stream) = object.as_stream() else {
                bail!("object {number} is a {}, not a stream", object.type_name());
            };
            let decoded = document
                .decode_stream(stream)
                .with_context(|| format!("failed to decode stream {number}"))?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &decoded)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Wrote {} bytes to {}", decoded.len(), path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&decoded)?;
                }
            }
        }
    }

    Ok(())
}
