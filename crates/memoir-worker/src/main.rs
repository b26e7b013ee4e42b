//! Story assembly and clip ingestion worker binary.
//!
//! ```text
//! memoir-worker assemble <blob-id>... [--target-seconds N]
//! memoir-worker ingest <clip-id> <blob-id> <original-name>
//! ```

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use memoir_media::FfmpegTranscoder;
use memoir_models::{BlobId, ClipId, ClipReference, EncodingConfig, IngestJob};
use memoir_storage::{BlobStore, S3BlobStore};
use memoir_worker::{
    assemble_story, AssemblyConfig, ClipAssembler, IngestDispatcher, IngestPipeline, IngestReport,
    KeywordTagger, WhisperTranscriber,
};

#[derive(Debug)]
enum Command {
    Assemble {
        clips: Vec<ClipReference>,
        target_seconds: Option<f64>,
    },
    Ingest(IngestJob),
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let (command, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("usage: memoir-worker <assemble|ingest> ..."))?;

    match command.as_str() {
        "assemble" => {
            let mut clips = Vec::new();
            let mut target_seconds = None;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                if arg == "--target-seconds" {
                    let value = iter
                        .next()
                        .ok_or_else(|| anyhow!("--target-seconds requires a value"))?;
                    target_seconds = Some(
                        value
                            .parse::<f64>()
                            .with_context(|| format!("invalid --target-seconds: {}", value))?,
                    );
                } else {
                    // The blob id doubles as the clip id when run by hand.
                    clips.push(ClipReference::new(ClipId::from(arg.as_str()), BlobId::from(arg.as_str())));
                }
            }
            Ok(Command::Assemble {
                clips,
                target_seconds,
            })
        }
        "ingest" => match rest {
            [clip_id, blob_id, original_name] => Ok(Command::Ingest(IngestJob {
                clip_id: ClipId::from(clip_id.as_str()),
                blob_id: BlobId::from(blob_id.as_str()),
                original_name: original_name.clone(),
            })),
            _ => bail!("usage: memoir-worker ingest <clip-id> <blob-id> <original-name>"),
        },
        other => bail!("unknown command: {}", other),
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["memoir=info", "aws_config=warn", "aws_smithy_runtime=warn"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let config = AssemblyConfig::from_env();
    info!("Assembly config: {:?}", config);

    let store: Arc<dyn BlobStore> = Arc::new(
        S3BlobStore::from_env()
            .await
            .context("Failed to connect to blob storage")?,
    );

    match command {
        Command::Assemble {
            clips,
            target_seconds,
        } => {
            let assembler = ClipAssembler::with_ffmpeg(store, config);
            let result = assemble_story(&assembler, clips, target_seconds).await?;
            println!("{}", result.output_blob_id);
        }
        Command::Ingest(job) => {
            let transcoder = Arc::new(
                FfmpegTranscoder::new(EncodingConfig::default())
                    .with_timeout(config.ffmpeg_timeout.as_secs()),
            );
            let pipeline = IngestPipeline::new(
                store,
                transcoder,
                Arc::new(WhisperTranscriber::from_env()?),
                Arc::new(KeywordTagger::new()),
                config.workspace(),
            );

            let (dispatcher, mut reports) = IngestDispatcher::new(Arc::new(pipeline));
            dispatcher.dispatch(job);
            drop(dispatcher);

            match reports.recv().await {
                Some(IngestReport::Completed(outcome)) => {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
                Some(IngestReport::Failed { clip_id, error }) => {
                    bail!("ingestion of {} failed: {}", clip_id, error);
                }
                None => bail!("ingestion task exited without a report"),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|p| p.parse().ok()) {
        if let Err(e) = memoir_worker::metrics::init_metrics(port) {
            error!("Failed to start metrics exporter: {}", e);
        }
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    info!("Starting memoir-worker");
    if let Err(e) = run(command).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_assemble() {
        let command = parse_args(&args(&["assemble", "b1", "--target-seconds", "30", "b2"])).unwrap();
        match command {
            Command::Assemble {
                clips,
                target_seconds,
            } => {
                assert_eq!(clips.len(), 2);
                assert_eq!(clips[1].blob_id.as_str(), "b2");
                assert_eq!(target_seconds, Some(30.0));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ingest() {
        let command = parse_args(&args(&["ingest", "clip-1", "blob-1", "beach.mov"])).unwrap();
        assert!(matches!(command, Command::Ingest(ref job) if job.original_name == "beach.mov"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args(&["assemble", "--target-seconds"])).is_err());
        assert!(parse_args(&args(&["assemble", "--target-seconds", "soon"])).is_err());
        assert!(parse_args(&args(&["ingest", "clip-1"])).is_err());
        assert!(parse_args(&args(&["render"])).is_err());
    }
}
