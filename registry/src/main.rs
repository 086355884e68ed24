//! Command line access to a registry's storage.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use eyre::WrapErr;
use registry::{Digest, Reference, RegistryConfig, RepositoryName, Tag};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect and populate container registry storage")]
struct Args {
    /// Registry configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Utf8PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a blob and print its digest
    Put {
        /// File to store, or standard input when omitted
        file: Option<Utf8PathBuf>,
    },

    /// Write a blob to standard output, or a file
    Get {
        /// Digest of the blob, e.g. sha256:e3b0...
        digest: Digest,

        /// Write to this file instead of standard output
        #[arg(short, long, value_name = "FILE")]
        output: Option<Utf8PathBuf>,
    },

    /// Resolve a tag or digest and print the manifest
    Manifest {
        /// Repository name, e.g. library/alpine
        name: RepositoryName,

        /// Tag or digest
        reference: Reference,

        /// Print only this field of the manifest, e.g. `config.digest`
        #[arg(long, value_name = "PATH")]
        json_field: Option<String>,
    },

    /// Store a manifest in a repository and print its digest
    Push {
        /// Repository name
        name: RepositoryName,

        /// Manifest file (JSON)
        file: Utf8PathBuf,

        /// Point this tag at the stored manifest
        #[arg(short, long)]
        tag: Option<Tag>,
    },

    /// List a repository's tags
    Tags {
        /// Repository name
        name: RepositoryName,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let registry = RegistryConfig::from_file(&args.config)
        .await?
        .build()
        .await
        .wrap_err_with(|| format!("building registry from {}", args.config))?;

    let mut stdout = tokio::io::stdout();
    match args.command {
        Command::Put { file } => {
            let digest = match file {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .wrap_err_with(|| format!("opening {path}"))?;
                    registry.blobs().put(file).await?
                }
                None => registry.blobs().put(tokio::io::stdin()).await?,
            };
            stdout.write_all(format!("{digest}\n").as_bytes()).await?;
        }
        Command::Get { digest, output } => {
            let mut blob = registry.blobs().get(&digest).await?;
            match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .wrap_err_with(|| format!("creating {path}"))?;
                    tokio::io::copy_buf(&mut blob, &mut file).await?;
                    file.sync_all().await?;
                }
                None => {
                    tokio::io::copy_buf(&mut blob, &mut stdout).await?;
                }
            }
        }
        Command::Manifest {
            name,
            reference,
            json_field,
        } => {
            let manifest = registry.repository(name).manifest(&reference).await?;
            tracing::info!(digest = %manifest.digest(), media_type = %manifest.media_type(), "Resolved manifest");
            match json_field {
                Some(field) => {
                    let json = manifest.json()?;
                    let value = lookup(&json, &field)
                        .ok_or_else(|| eyre::eyre!("manifest has no field {field}"))?;
                    let text = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    stdout.write_all(format!("{text}\n").as_bytes()).await?;
                }
                None => stdout.write_all(manifest.bytes()).await?,
            }
        }
        Command::Push { name, file, tag } => {
            let body = tokio::fs::read(&file)
                .await
                .wrap_err_with(|| format!("reading {file}"))?;
            let digest = registry
                .repository(name)
                .put_manifest(&body, tag.as_ref())
                .await?;
            stdout.write_all(format!("{digest}\n").as_bytes()).await?;
        }
        Command::Tags { name } => {
            for tag in registry.repository(name).tags().await? {
                stdout.write_all(format!("{tag}\n").as_bytes()).await?;
            }
        }
    }

    stdout.flush().await?;
    Ok(())
}

/// Follow a dotted path such as `layers.0.digest` into a JSON document.
fn lookup<'v>(json: &'v serde_json::Value, path: &str) -> Option<&'v serde_json::Value> {
    path.split('.').try_fold(json, |value, key| match value {
        serde_json::Value::Array(items) => items.get(key.parse::<usize>().ok()?),
        _ => value.get(key),
    })
}
