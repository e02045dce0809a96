use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use spimi_core::config::DEFAULT_BLOCK_SIZE;
use spimi_core::{
    write_compressed, write_uncompressed, CompressedIndexReader, CompressionOptions, GapCodec,
    InvertedIndex, SpimiBuilder, StopWords, TermEntry, UncompressedIndexReader,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "spimi")]
#[command(about = "Build and inspect compressed inverted indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an index from a token file and write both layouts
    Build(BuildArgs),
    /// Print the postings of a term from a written index
    Lookup(LookupArgs),
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// File of `term doc_id` lines, already normalized
    #[arg(long)]
    tokens: PathBuf,

    /// Output directory for the index files
    #[arg(long, default_value = "./data")]
    out: PathBuf,

    /// Index snapshot: loaded if present, written after building otherwise
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Terms per dictionary block
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Gap code for postings (gamma, delta)
    #[arg(long, default_value = "gamma")]
    codec: GapCodec,

    /// Store whole terms in the compressed dictionary
    #[arg(long)]
    no_front_coding: bool,

    /// Index stop words too
    #[arg(long)]
    no_stop_words: bool,
}

#[derive(Args, Debug)]
struct LookupArgs {
    /// Directory holding a written index
    #[arg(long, default_value = "./data")]
    dir: PathBuf,

    /// Read the uncompressed layout instead of the compressed one
    #[arg(long)]
    uncompressed: bool,

    term: String,
}

/// Parse one `term doc_id` line; blank lines yield `None`
fn parse_line(line: &str) -> Result<Option<(&str, u32)>> {
    let mut fields = line.split_whitespace();
    let (term, doc_id) = match (fields.next(), fields.next(), fields.next()) {
        (None, _, _) => return Ok(None),
        (Some(term), Some(doc_id), None) => (term, doc_id),
        _ => bail!("expected `term doc_id`, got {line:?}"),
    };
    let doc_id = doc_id
        .parse::<u32>()
        .with_context(|| format!("invalid document id {doc_id:?}"))?;
    Ok(Some((term, doc_id)))
}

fn build_index(tokens: &Path, stop_words: StopWords) -> Result<InvertedIndex> {
    let file = File::open(tokens).with_context(|| format!("opening {}", tokens.display()))?;
    let mut builder = SpimiBuilder::with_stop_words(stop_words);
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let location = || format!("{}:{}", tokens.display(), line_no + 1);
        if let Some((term, doc_id)) = parse_line(&line).with_context(location)? {
            builder.add(term, doc_id).with_context(location)?;
        }
    }
    Ok(builder.finish())
}

fn load_or_build(args: &BuildArgs) -> Result<InvertedIndex> {
    if let Some(snapshot) = args.snapshot.as_deref().filter(|p| p.exists()) {
        return InvertedIndex::load_snapshot(snapshot)
            .with_context(|| format!("loading snapshot {}", snapshot.display()));
    }

    let stop_words = if args.no_stop_words {
        StopWords::none()
    } else {
        StopWords::default()
    };
    let start = Instant::now();
    let index = build_index(&args.tokens, stop_words)?;
    let stats = index.stats();
    info!(
        terms = stats.num_terms,
        docs = stats.num_docs,
        tokens = stats.total_tokens,
        "Built index in {:.3} sec",
        start.elapsed().as_secs_f64()
    );

    if let Some(snapshot) = &args.snapshot {
        index
            .save_snapshot(snapshot)
            .with_context(|| format!("saving snapshot {}", snapshot.display()))?;
    }
    Ok(index)
}

fn run_build(args: &BuildArgs) -> Result<()> {
    let options = CompressionOptions {
        block_size: args.block_size,
        codec: args.codec,
        front_coding: !args.no_front_coding,
    };
    options.validate()?;

    let index = load_or_build(args)?;

    let start = Instant::now();
    let plain = write_uncompressed(&index, &args.out)?;
    info!(
        bytes = plain.index_bytes(),
        "Wrote uncompressed index to disk in {:.3} sec",
        start.elapsed().as_secs_f64()
    );

    let start = Instant::now();
    let packed = write_compressed(&index, &args.out, &options)?;
    info!(
        bytes = packed.index_bytes(),
        "Wrote compressed index to disk in {:.3} sec",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn lookup(args: &LookupArgs) -> Result<Option<TermEntry>> {
    let entry = if args.uncompressed {
        UncompressedIndexReader::open(&args.dir)?.lookup(&args.term)?
    } else {
        CompressedIndexReader::open(&args.dir)?.lookup(&args.term)?
    };
    Ok(entry)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Build(args) => run_build(&args),
        Command::Lookup(args) => {
            match lookup(&args)? {
                Some(entry) => {
                    println!("{}\tdf={}", args.term, entry.df());
                    for posting in entry.postings() {
                        println!("{}\t{}", posting.doc_id, posting.tf);
                    }
                }
                None => println!("{}\tnot found", args.term),
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("wing\t12").unwrap(), Some(("wing", 12)));
        assert_eq!(parse_line("  flow 3 ").unwrap(), Some(("flow", 3)));
        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(parse_line("wing").is_err());
        assert!(parse_line("wing -1").is_err());
        assert!(parse_line("wing 1 2").is_err());
    }

    #[test]
    fn test_build_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let tokens = dir.path().join("tokens.tsv");
        let mut file = File::create(&tokens).unwrap();
        writeln!(file, "the\t0\nshock\t0\nwave\t0\n\nshock\t1\nshock\t1").unwrap();
        drop(file);

        let args = BuildArgs {
            tokens: tokens.clone(),
            out: dir.path().join("data"),
            snapshot: Some(dir.path().join("index.json")),
            block_size: 2,
            codec: GapCodec::Delta,
            no_front_coding: false,
            no_stop_words: false,
        };
        run_build(&args).unwrap();
        assert!(dir.path().join("index.json").exists());

        for uncompressed in [false, true] {
            let found = lookup(&LookupArgs {
                dir: args.out.clone(),
                uncompressed,
                term: "shock".to_string(),
            })
            .unwrap()
            .unwrap();
            assert_eq!(found.df(), 2);
            assert_eq!(found.tf(1), Some(2));

            let missing = lookup(&LookupArgs {
                dir: args.out.clone(),
                uncompressed,
                term: "the".to_string(),
            })
            .unwrap();
            assert!(missing.is_none());
        }

        // second run reuses the snapshot even without the token file
        std::fs::remove_file(&tokens).unwrap();
        run_build(&args).unwrap();
    }

    #[test]
    fn test_bad_token_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let tokens = dir.path().join("tokens.tsv");
        std::fs::write(&tokens, "lift 0\nlift zero\n").unwrap();
        let err = build_index(&tokens, StopWords::none()).unwrap_err();
        assert!(format!("{err:#}").contains("tokens.tsv:2"));
    }
}
