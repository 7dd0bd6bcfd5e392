use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use penmark_convert::ConverterConfig;
use penmark_doc_io::{PageSetup, SaveOutcome, SaveTarget, pdf_print_request, save_as};
use penmark_workbench::DocumentSession;
use tracing_subscriber::EnvFilter;

/// Headless workbench for the editing core: open a document, apply a
/// command script, inspect state, save.
#[derive(Debug, Parser)]
#[command(name = "penmark-workbench", version)]
struct Args {
    /// Document to open (html, mhtml, md, txt, or a convertible format).
    path: Option<PathBuf>,

    /// Command script: one `name [json-args]` per line, e.g.
    /// `formatBlock {"tag":"h1"}`.
    #[arg(long)]
    apply: Option<PathBuf>,

    /// Save the result here (target format from the extension).
    #[arg(long)]
    save_as: Option<PathBuf>,

    /// Print the resulting body HTML to stdout.
    #[arg(long)]
    print_body: bool,

    /// Print the formatting state at the caret to stdout.
    #[arg(long)]
    print_state: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let converter = ConverterConfig::from_env();
    let mut session = DocumentSession::new(converter.clone());

    if let Some(path) = &args.path {
        session.open(path)?;
    }

    if let Some(script) = &args.apply {
        let script = std::fs::read_to_string(script)
            .with_context(|| format!("could not read script {}", script.display()))?;
        for (line_no, line) in script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let args_value = if rest.trim().is_empty() {
                None
            } else {
                Some(
                    serde_json::from_str(rest.trim())
                        .with_context(|| format!("bad args on script line {}", line_no + 1))?,
                )
            };
            session.surface().command(name, args_value)?;
        }
    }

    session.pump();

    if args.print_state {
        let state = penmark_channel::Dispatcher::query_state(session.surface())?;
        println!("{}", serde_json::to_string_pretty(&state)?);
    }
    if args.print_body {
        println!("{}", session.surface().body_html()?);
    }

    if let Some(out) = &args.save_as {
        let target = SaveTarget::from_path(out);
        let body = session.surface().body_html()?;
        let title = out
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        if target == SaveTarget::Pdf {
            let request = pdf_print_request(&title, &body, PageSetup::default());
            let (w, h) = request.setup.page_dimensions_pt();
            eprintln!("pdf export is delegated to the rendering surface ({w}x{h}pt page)");
        }
        match save_as(out, &title, &body, target, &converter)? {
            SaveOutcome::Saved { path, .. } => eprintln!("saved {}", path.display()),
            SaveOutcome::Degraded {
                path,
                requested,
                reason,
            } => eprintln!(
                "{requested:?} export unavailable ({reason}); wrote {} instead",
                path.display()
            ),
        }
    }

    Ok(())
}
