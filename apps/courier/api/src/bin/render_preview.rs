//! Render an HTML fragment the way the courier would send it.
//!
//! Run with: cargo run -p courier_api --bin render_preview -- message.html --subject "Hello"

use clap::{Parser, ValueEnum};
use color_eyre::Result;
use core_config::{mail::MailSettings, FromEnv};
use domain_mail::{html_to_text, EmailDocument, HtmlDocument, MessageRenderer, Priority};
use eyre::WrapErr;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Preview outgoing mail rendered from an HTML fragment")]
struct Args {
    /// HTML file to render; `-` reads standard input
    input: PathBuf,

    /// Subject line
    #[arg(short, long, default_value = "Preview")]
    subject: String,

    /// Recipient shown in the preview
    #[arg(short, long, default_value = "preview@example.com")]
    recipient: String,

    /// Message priority
    #[arg(short, long, value_enum, default_value = "normal")]
    priority: PriorityArg,

    /// What to print
    #[arg(short, long, value_enum, default_value = "mime")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PriorityArg {
    Normal,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Headers and multipart body exactly as submitted
    Mime,
    /// Only the plain-text transcoding of the input
    Text,
}

fn read_input(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut html = String::new();
        std::io::stdin()
            .read_to_string(&mut html)
            .wrap_err("Failed to read standard input")?;
        return Ok(html);
    }
    std::fs::read_to_string(path).wrap_err_with(|| format!("Failed to read {}", path.display()))
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let html = read_input(&args.input)?;

    match args.output {
        OutputFormat::Text => print!("{}", html_to_text(&html)),
        OutputFormat::Mime => {
            let settings = MailSettings::from_env().wrap_err("Failed to load mail settings")?;
            let renderer = MessageRenderer::new(settings);
            let document = HtmlDocument::new(args.recipient, args.subject, html).with_priority(args.priority.into());
            let message = renderer.render(&document)?;

            println!("To: {}", document.recipient());
            println!("Subject: {}", message.subject);
            println!("{}", message.headers);
            println!();
            print!("{}", message.body);
        }
    }

    Ok(())
}
