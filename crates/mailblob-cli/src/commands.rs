use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use mailblob_store::{
    BackendConfig, BlobContent, BlobStore, BlobStoreConfig, BlobStoreFactory, StorageConfig,
};
use mailblob_types::{BlobId, BucketName};
use tokio::io::AsyncWriteExt;

use crate::cli::*;

const DEFAULT_ROOT: &str = ".mailblob";

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let store = BlobStoreFactory::build(&config)
        .await
        .context("failed to build blob store")?;
    match cli.command {
        Command::Save(args) => cmd_save(store, args).await,
        Command::Read(args) => cmd_read(store, args).await,
        Command::Delete(args) => cmd_delete(store, args).await,
        Command::DeleteBucket(args) => cmd_delete_bucket(store, args).await,
        Command::List(args) => cmd_list(store, args).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BlobStoreConfig> {
    match path {
        Some(path) => BlobStoreConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(BlobStoreConfig {
            storage: StorageConfig::Single {
                backend: BackendConfig::File {
                    root: PathBuf::from(DEFAULT_ROOT),
                },
            },
            ..BlobStoreConfig::default()
        }),
    }
}

fn bucket_or_default(store: &dyn BlobStore, bucket: Option<String>) -> anyhow::Result<BucketName> {
    match bucket {
        Some(name) => BucketName::new(name).context("invalid bucket name"),
        None => Ok(store.default_bucket_name().clone()),
    }
}

fn parse_blob_id(raw: &str) -> anyhow::Result<BlobId> {
    BlobId::parse(raw).with_context(|| format!("invalid blob id {raw}"))
}

async fn cmd_save(store: Arc<dyn BlobStore>, args: SaveArgs) -> anyhow::Result<()> {
    let bucket = bucket_or_default(store.as_ref(), args.bucket)?;
    let content = if args.input == "-" {
        BlobContent::from_reader(tokio::io::stdin())
    } else {
        let file = tokio::fs::File::open(&args.input)
            .await
            .with_context(|| format!("cannot open {}", args.input))?;
        BlobContent::from_reader(file)
    };
    let blob_id = store.save(&bucket, content, args.policy).await?;
    println!("{} Saved {} in {}", "✓".green().bold(), blob_id.to_string().yellow(), bucket.as_str().bold());
    Ok(())
}

async fn cmd_read(store: Arc<dyn BlobStore>, args: ReadArgs) -> anyhow::Result<()> {
    let bucket = bucket_or_default(store.as_ref(), args.bucket)?;
    let blob_id = parse_blob_id(&args.blob_id)?;
    let data = store.read_bytes(&bucket, blob_id).await?;
    match args.output {
        Some(path) => {
            tokio::fs::write(&path, &data)
                .await
                .with_context(|| format!("cannot write {}", path.display()))?;
            eprintln!("{} Wrote {} bytes to {}", "✓".green().bold(), data.len(), path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn cmd_delete(store: Arc<dyn BlobStore>, args: DeleteArgs) -> anyhow::Result<()> {
    let bucket = bucket_or_default(store.as_ref(), args.bucket)?;
    let blob_id = parse_blob_id(&args.blob_id)?;
    store.delete(&bucket, blob_id).await?;
    println!("Deleted {} from {}", blob_id.to_string().yellow(), bucket.as_str().bold());
    Ok(())
}

async fn cmd_delete_bucket(store: Arc<dyn BlobStore>, args: DeleteBucketArgs) -> anyhow::Result<()> {
    let bucket = BucketName::new(args.bucket).context("invalid bucket name")?;
    store.delete_bucket(&bucket).await?;
    println!("Deleted bucket {}", bucket.as_str().bold());
    Ok(())
}

async fn cmd_list(store: Arc<dyn BlobStore>, args: ListArgs) -> anyhow::Result<()> {
    let bucket = bucket_or_default(store.as_ref(), args.bucket)?;
    let blobs = store.list_blobs(&bucket).await?;
    if blobs.is_empty() {
        println!("No blobs in {}.", bucket.as_str().bold());
    }
    for blob_id in blobs {
        let kind = if blob_id.is_content_addressed() { "hash" } else { "uuid" };
        println!("{}  {}", blob_id.to_string().yellow(), kind.dimmed());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_local_file_store() {
        let config = load_config(None).unwrap();
        assert!(config.deduplication);
        assert_eq!(
            config.storage,
            StorageConfig::Single {
                backend: BackendConfig::File {
                    root: PathBuf::from(DEFAULT_ROOT)
                }
            }
        );
    }

    #[test]
    fn missing_config_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to load configuration"));
    }

    #[tokio::test]
    async fn save_then_read_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mail.eml");
        std::fs::write(&input, b"Subject: hi\r\n\r\nbody").unwrap();
        let config = BlobStoreConfig {
            storage: StorageConfig::Single {
                backend: BackendConfig::File {
                    root: dir.path().join("store"),
                },
            },
            ..BlobStoreConfig::default()
        };
        let store = BlobStoreFactory::build(&config).await.unwrap();

        cmd_save(
            store.clone(),
            SaveArgs {
                input: input.display().to_string(),
                bucket: None,
                policy: mailblob_types::StoragePolicy::SizeBased,
            },
        )
        .await
        .unwrap();

        let bucket = store.default_bucket_name().clone();
        let ids = store.list_blobs(&bucket).await.unwrap();
        assert_eq!(ids.len(), 1);

        let output = dir.path().join("out.eml");
        cmd_read(
            store.clone(),
            ReadArgs {
                blob_id: ids[0].to_string(),
                bucket: None,
                output: Some(output.clone()),
            },
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"Subject: hi\r\n\r\nbody");

        let err = cmd_delete_bucket(store, DeleteBucketArgs { bucket: bucket.to_string() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("default bucket"));
    }

    #[test]
    fn blob_ids_are_validated() {
        assert!(parse_blob_id("not-an-id").is_err());
        assert!(parse_blob_id(&BlobId::random().to_string()).is_ok());
    }
}
