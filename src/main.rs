use anyhow::{Context as _, Result};
use clap::Parser;
use protofs::{Context, DecodeOptions, Decoder};
use std::path::PathBuf;

/// Decode protocol buffer messages and present them as a directory tree.
#[derive(Parser, Debug)]
#[command(name = "protofs", version, about)]
struct Args
{
    /// Schema file. May be given multiple times.
    #[arg(long = "proto", value_name = "FILE", required = true)]
    protos: Vec<PathBuf>,

    /// Fully qualified name of the message the buffers contain.
    #[arg(long, value_name = "NAME")]
    message: String,

    /// Mount the decoded tree here instead of printing it.
    #[arg(long, value_name = "DIR")]
    mount: Option<PathBuf>,

    /// Maximum depth of nested messages.
    #[arg(
        long,
        value_name = "N",
        env = "PROTOFS_RECURSION_LIMIT",
        default_value_t = DecodeOptions::default().recursion_limit
    )]
    recursion_limit: usize,

    /// Files holding the serialized messages.
    #[arg(value_name = "BUFFER")]
    buffers: Vec<PathBuf>,
}

fn main() -> Result<()>
{
    env_logger::init();
    let args = Args::parse();

    let schemas = args
        .protos
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("read schema {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let context = Context::parse(&schemas).context("parse schema files")?;

    let msg = context
        .get_message(&args.message)
        .with_context(|| format!("message '{}' not found in the schema", args.message))?;

    let buffers = args
        .buffers
        .iter()
        .map(|path| std::fs::read(path).with_context(|| format!("read buffer {}", path.display())))
        .collect::<Result<Vec<_>>>()?;

    let options = DecodeOptions {
        recursion_limit: args.recursion_limit,
    };
    let tree = Decoder::with_options(&context, options)
        .decode(msg, &buffers)
        .with_context(|| format!("decode buffers as '{}'", args.message))?;

    match &args.mount {
        Some(mountpoint) => mount(&tree, mountpoint),
        None => {
            print!("{}", tree);
            Ok(())
        }
    }
}

#[cfg(feature = "fuse")]
fn mount(tree: &protofs::ValueTree, mountpoint: &std::path::Path) -> Result<()>
{
    protofs::mount::mount(tree, mountpoint)
        .with_context(|| format!("mount {}", mountpoint.display()))
}

#[cfg(not(feature = "fuse"))]
fn mount(_tree: &protofs::ValueTree, _mountpoint: &std::path::Path) -> Result<()>
{
    Err(anyhow::anyhow!(
        "fuse support disabled; rebuild protofs with --features fuse"
    ))
}
