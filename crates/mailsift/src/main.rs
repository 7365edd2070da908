//! `mailsift`: dumps the structure and parse diagnostics of a raw message.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mailsift_mime::{Envelope, Part, ParserOptions, PartRole};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mailsift", version)]
struct Cli {
    /// Raw message file, or `-` for stdin
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Print the envelope as JSON
    #[arg(long)]
    json: bool,

    /// Maximum multipart nesting depth
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Reject messages larger than this many bytes
    #[arg(long, value_name = "BYTES")]
    max_size: Option<usize>,

    /// Charset tried when the declared one and UTF-8 both fail
    #[arg(long, value_name = "LABEL")]
    fallback_charset: Option<String>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "mailsift=info,mailsift_mime=warn",
        1 => "mailsift=debug,mailsift_mime=debug",
        _ => "mailsift=trace,mailsift_mime=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let options = build_options(&cli);
    let envelope = if cli.file.as_os_str() == "-" {
        Envelope::read_from(io::stdin().lock(), &options).context("Failed to parse stdin")?
    } else {
        let file = File::open(&cli.file)
            .with_context(|| format!("Failed to open {}", cli.file.display()))?;
        Envelope::read_from(BufReader::new(file), &options)
            .with_context(|| format!("Failed to parse {}", cli.file.display()))?
    };
    info!(
        parts = envelope.parts().len(),
        findings = envelope.diagnostics().len(),
        "Parsed message"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.json {
        serde_json::to_writer_pretty(&mut out, &envelope).context("Failed to write JSON")?;
        writeln!(out)?;
    } else {
        print_summary(&mut out, &envelope)?;
    }
    Ok(())
}

fn build_options(cli: &Cli) -> ParserOptions {
    let mut builder = ParserOptions::builder();
    if let Some(depth) = cli.max_depth {
        builder = builder.max_depth(depth);
    }
    if let Some(size) = cli.max_size {
        builder = builder.max_message_size(size);
    }
    if let Some(label) = &cli.fallback_charset {
        builder = builder.fallback_charset(label);
    }
    builder.build()
}

fn print_summary(out: &mut impl Write, envelope: &Envelope) -> io::Result<()> {
    let none = "(none)";
    writeln!(out, "From:       {}", envelope.from().unwrap_or(none))?;
    writeln!(out, "To:         {}", envelope.to().unwrap_or(none))?;
    if let Some(cc) = envelope.cc() {
        writeln!(out, "Cc:         {cc}")?;
    }
    writeln!(out, "Subject:    {}", envelope.subject().unwrap_or(none))?;
    match envelope.date() {
        Some(date) => writeln!(out, "Date:       {}", date.to_rfc3339())?,
        None => writeln!(out, "Date:       {none}")?,
    }
    writeln!(out, "Message-ID: {}", envelope.message_id().unwrap_or(none))?;
    writeln!(out)?;

    writeln!(
        out,
        "Text: {}",
        envelope.text().map_or_else(|| none.to_string(), |t| format!("{} bytes", t.len()))
    )?;
    writeln!(
        out,
        "HTML: {}",
        envelope.html().map_or_else(|| none.to_string(), |h| format!("{} bytes", h.len()))
    )?;
    writeln!(out)?;

    writeln!(out, "Parts:")?;
    for part in envelope.parts() {
        writeln!(out, "  {}", describe(part))?;
    }

    let attachments: Vec<_> = envelope.attachments().collect();
    if !attachments.is_empty() {
        writeln!(out)?;
        writeln!(out, "Attachments:")?;
        for part in attachments {
            writeln!(
                out,
                "  {} {} ({} bytes)",
                part.id,
                part.file_name.as_deref().unwrap_or("(unnamed)"),
                part.content_bytes().len()
            )?;
        }
    }

    let inlines: Vec<_> = envelope.inlines().collect();
    if !inlines.is_empty() {
        writeln!(out)?;
        writeln!(out, "Inline:")?;
        for part in inlines {
            writeln!(
                out,
                "  {} {} cid={}",
                part.id,
                part.content_type.mime_type(),
                part.content_id.as_deref().unwrap_or("-")
            )?;
        }
    }

    writeln!(out)?;
    if envelope.diagnostics().is_empty() {
        writeln!(out, "Diagnostics: none")?;
    } else {
        writeln!(out, "Diagnostics:")?;
        for finding in envelope.diagnostics() {
            writeln!(out, "  {finding}")?;
        }
    }
    Ok(())
}

fn describe(part: &Part) -> String {
    let role = match part.role {
        PartRole::Container => "container",
        PartRole::Body => "body",
        PartRole::Inline => "inline",
        PartRole::Attachment => "attachment",
    };
    let mut line = format!(
        "{}{} {} [{role}]",
        "  ".repeat(part.depth),
        part.id,
        part.content_type.mime_type()
    );
    if part.is_leaf() {
        line.push_str(&format!(" {} bytes", part.content_bytes().len()));
    }
    if let Some(charset) = part.charset {
        line.push_str(&format!(" charset={charset}"));
    }
    if let Some(name) = &part.file_name {
        line.push_str(&format!(" name={name:?}"));
    }
    line
}
