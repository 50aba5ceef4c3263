use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ragstudio_app::config::{LocalRuntimeConfig, RepositoryBackend, StudioConfig};
use ragstudio_app::studio::{Collaborators, Studio};
use ragstudio_bedrock::builder::BedrockModelBuilder;
use ragstudio_core::models::chat::ChatMessage;
use ragstudio_core::models::sampling::{SamplingParams, SamplingRequest, StopSequences};
use ragstudio_runtime::builder::{ModelBuilder, ModelCache};
use ragstudio_runtime::negotiate::NegotiationPolicy;
use ragstudio_runtime::resources::{FixedProbe, NvidiaSmiProbe, ResourceProbe};
use ragstudio_search::engine::Response;
use ragstudio_storage::local::LocalSnapshotRepository;
use ragstudio_storage::repository::SnapshotRepository;
use ragstudio_storage::s3::S3SnapshotRepository;
use ragstudio_vllm::builder::{VllmModelBuilder, VllmOptions};
use ragstudio_vllm::server::ServeOptions;

#[derive(Parser)]
#[command(name = "ragstudio", version, about = "Build and serve retrieval-augmented chat apps")]
struct Cli {
    /// Load the committed app read-only instead of opening it for editing.
    #[arg(long, global = true)]
    inference: bool,

    /// Serve models with vLLM on local GPUs, probed with nvidia-smi and
    /// sized by negotiation. Without it models are hosted on Bedrock.
    #[arg(long, global = true)]
    probe_gpus: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the app summary as JSON.
    Summary,
    /// List ingested files.
    Files,
    /// Ingest files and checkpoint.
    Ingest { paths: Vec<PathBuf> },
    /// Ask a single question.
    Query {
        prompt: String,
        #[command(flatten)]
        sampling: SamplingArgs,
    },
    /// Ask a question as a user and record the turn.
    Chat {
        #[arg(long, default_value = "cli")]
        user: String,
        message: String,
        #[command(flatten)]
        sampling: SamplingArgs,
    },
    /// Swap the generation model.
    SwapModel {
        model: String,
        #[arg(long)]
        clear_space: bool,
    },
    /// Swap the embedding model (empty index only).
    SwapEmbeddingModel { model: String },
    /// Rename the app.
    SetAppName { name: String },
}

/// Per-request generation controls, named as in OpenAI style APIs.
#[derive(Args)]
struct SamplingArgs {
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    top_p: Option<f32>,
    #[arg(long)]
    max_tokens: Option<u32>,
    /// Stop sequence; repeat for several.
    #[arg(long)]
    stop: Vec<String>,
    #[arg(long)]
    presence_penalty: Option<f32>,
    #[arg(long)]
    frequency_penalty: Option<f32>,
    /// Completions per request. Only 1 is supported.
    #[arg(long)]
    n: Option<u32>,
}

impl SamplingArgs {
    fn into_params(self) -> eyre::Result<SamplingParams> {
        let request = SamplingRequest {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stop: (!self.stop.is_empty()).then_some(StopSequences::Many(self.stop)),
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            n: self.n,
            ..SamplingRequest::default()
        };
        Ok(request.into_params()?)
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = StudioConfig::from_env()?;

    let (repository, region) = build_repository(&config.backend).await;
    let cache = ModelCache::new(config.models_download_folder.clone());
    let policy = NegotiationPolicy::default();
    let (builder, probe): (Arc<dyn ModelBuilder>, Arc<dyn ResourceProbe>) = if cli.probe_gpus {
        let options = vllm_options(&config.local_runtime, &policy);
        (
            Arc::new(VllmModelBuilder::new(cache, options)),
            Arc::new(NvidiaSmiProbe::default()),
        )
    } else {
        (
            Arc::new(BedrockModelBuilder::from_env(region.as_deref(), cache).await),
            Arc::new(FixedProbe::default()),
        )
    };

    let deps = Collaborators {
        repository,
        builder,
        probe,
        policy,
    };
    let mut studio = if cli.inference {
        Studio::boot_inference(config, deps).await?
    } else {
        Studio::boot(config, deps).await?
    };

    match cli.command {
        Command::Summary => {
            println!("{}", serde_json::to_string_pretty(&studio.summary().await?)?);
        }
        Command::Files => {
            for file in studio.list_files() {
                println!("{}", file.as_deref().unwrap_or("<unnamed>"));
            }
        }
        Command::Ingest { paths } => {
            for path in &paths {
                let nodes = studio.ingest_document(path).await?;
                println!("{}: {nodes} nodes", path.display());
            }
            let commit = studio.checkpoint().await?;
            println!("checkpoint {} at {}", commit.id, commit.created_at);
        }
        Command::Query { prompt, sampling } => {
            let sampling = sampling.into_params()?;
            print_response(&studio.query(&prompt, &sampling).await?);
        }
        Command::Chat {
            user,
            message,
            sampling,
        } => {
            let sampling = sampling.into_params()?;
            let mut messages: Vec<ChatMessage> = studio
                .get_thread(&user)
                .into_iter()
                .next()
                .map(|record| record.messages)
                .unwrap_or_default();
            messages.push(ChatMessage::user(message));
            print_response(&studio.chat_as(&user, &messages, &sampling).await?);
        }
        Command::SwapModel { model, clear_space } => {
            let max_len = studio.swap_model(&model, clear_space).await?;
            println!("{model} ready with a context window of {max_len} tokens");
        }
        Command::SwapEmbeddingModel { model } => {
            studio.swap_embedding_model(&model).await?;
            println!("embedding model set to {model}");
        }
        Command::SetAppName { name } => {
            studio.update_app_name(&name).await?;
            println!("app renamed to {name}");
        }
    }

    Ok(())
}

async fn build_repository(backend: &RepositoryBackend) -> (Arc<dyn SnapshotRepository>, Option<String>) {
    match backend {
        RepositoryBackend::S3 { bucket, region } => {
            let client = ragstudio_storage::client::build_client(region.as_deref()).await;
            let repository: Arc<dyn SnapshotRepository> =
                Arc::new(S3SnapshotRepository::new(client, bucket.clone()));
            (repository, region.clone())
        }
        RepositoryBackend::Local { root } => {
            let repository: Arc<dyn SnapshotRepository> =
                Arc::new(LocalSnapshotRepository::new(root.clone()));
            (repository, None)
        }
    }
}

fn vllm_options(runtime: &LocalRuntimeConfig, policy: &NegotiationPolicy) -> VllmOptions {
    VllmOptions {
        serve: ServeOptions {
            binary: runtime.vllm_binary.clone(),
            ..ServeOptions::default()
        },
        generation_port: runtime.generation_port,
        hub_endpoint: runtime.hub_endpoint.clone(),
        hub_token: runtime.hub_token.clone(),
        gpu_memory_utilization: policy.memory_utilization,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RAGSTUDIO_LOG_FORMAT").is_ok_and(|v| v == "json");
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_response(response: &Response) {
    println!("{}", response.response);
    for node in &response.source_nodes {
        println!(
            "  [{:.3}] {}",
            node.score,
            node.file_name.as_deref().unwrap_or("<unnamed>")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampling(args: &[&str]) -> eyre::Result<SamplingParams> {
        let cli = Cli::try_parse_from(["ragstudio", "query", "why?"].iter().chain(args))?;
        match cli.command {
            Command::Query { sampling, .. } => sampling.into_params(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn sampling_flags() {
        let params = sampling(&["--temperature", "0.2", "--stop", "END", "--stop", "STOP"]).unwrap();
        assert_eq!(params.temperature, Some(0.2));
        assert_eq!(params.stop, vec!["END".to_string(), "STOP".to_string()]);
        assert!(sampling(&[]).unwrap().is_default());
        assert!(sampling(&["--n", "1"]).is_ok());
    }

    #[test]
    fn unsupported_sampling_flags_are_refused() {
        assert!(sampling(&["--n", "2"]).is_err());
        assert!(sampling(&["--top-p", "1.5"]).is_err());
    }

    #[test]
    fn vllm_options_follow_config_and_policy() {
        let runtime = LocalRuntimeConfig {
            generation_port: 9100,
            ..LocalRuntimeConfig::default()
        };
        let policy = NegotiationPolicy {
            memory_utilization: 0.8,
            ..NegotiationPolicy::default()
        };
        let options = vllm_options(&runtime, &policy);
        assert_eq!(options.generation_port, 9100);
        assert_eq!(options.gpu_memory_utilization, 0.8);
        assert_eq!(options.serve.binary, runtime.vllm_binary);
    }
}
