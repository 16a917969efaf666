//! Extract command implementation.

use crate::cli::ExtractArgs;
use crate::config::{Config, ProviderKind, ProviderSettings};
use crate::error::{CliError, Result};
use crate::output::Formatter;
use sieve_domain::{ExtractionRequest, PipelineResult};
use sieve_extractor::{Extractor, RateLimitTracker, RunContext};
use sieve_llm::{CompletionService, MockProvider, OllamaProvider, OpenAiProvider};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Execute the extract command.
pub async fn execute_extract(args: ExtractArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let text = read_input(&args.file)?;
    if text.trim().is_empty() {
        eprintln!("{}", formatter.warning("Input is empty"));
    }

    let (ctx, cancel) = RunContext::cancellable();
    let ctx = match args.timeout {
        Some(secs) => ctx.with_timeout(Duration::from_secs(secs)),
        None => ctx,
    };

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling extraction");
            cancel.cancel();
        }
    });

    let outcome = run_extraction(&text, &args, config, ctx).await;
    interrupt.abort();

    let result = outcome?;
    println!("{}", formatter.format_result(&result)?);
    Ok(())
}

/// Run one extraction with the command's overrides applied to `config`.
pub async fn run_extraction(
    text: &str,
    args: &ExtractArgs,
    config: &Config,
    ctx: RunContext,
) -> Result<PipelineResult> {
    let mut config = config.clone();
    apply_args(args, &mut config);
    config.validate()?;

    let service = build_service(&config.provider)?;
    info!("Using provider {}", service.name());

    let tracker = Arc::new(RateLimitTracker::from_config(&config.extractor));
    let extractor = Extractor::with_tracker(service, tracker, config.extractor)?;
    let request = build_request(text, args);

    Ok(extractor.extract_with(&request, ctx).await?)
}

/// Fold command-line flags into the loaded configuration.
fn apply_args(args: &ExtractArgs, config: &mut Config) {
    if let Some(provider) = args.provider {
        config.provider.kind = provider.into();
    }
    if let Some(model) = &args.model {
        config.provider.model = model.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        config.provider.endpoint = Some(endpoint.clone());
    }
    if args.pattern_only {
        config.extractor.ai_enabled = false;
    }
}

fn build_request(text: &str, args: &ExtractArgs) -> ExtractionRequest {
    let mut request = ExtractionRequest::new(text);
    if let Some(platform) = &args.platform {
        request = request.with_metadata(sieve_domain::PLATFORM_KEY, platform.as_str());
    }
    if let Some(language) = &args.language {
        request = request.with_metadata(sieve_domain::LANGUAGE_KEY, language.as_str());
    }
    if let Some(name) = args.file.file_name().and_then(|n| n.to_str()) {
        if name != "-" {
            request = request.with_metadata("source_file", name);
        }
    }
    request
}

/// Construct the completion service named by the provider settings.
pub fn build_service(settings: &ProviderSettings) -> Result<Arc<dyn CompletionService>> {
    let service: Arc<dyn CompletionService> = match settings.kind {
        ProviderKind::Ollama => {
            let endpoint = settings
                .endpoint
                .as_deref()
                .unwrap_or(sieve_llm::ollama::DEFAULT_ENDPOINT);
            Arc::new(OllamaProvider::new(endpoint, settings.model.as_str())?)
        }
        ProviderKind::OpenAi => {
            let base_url = settings
                .endpoint
                .as_deref()
                .unwrap_or(sieve_llm::openai::DEFAULT_BASE_URL);
            let provider = match &settings.api_key {
                Some(key) => OpenAiProvider::new(base_url, key.as_str(), settings.model.as_str())?,
                None => OpenAiProvider::from_env(base_url, settings.model.as_str())?,
            };
            Arc::new(provider)
        }
        ProviderKind::Mock => Arc::new(MockProvider::default()),
    };
    Ok(service)
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        return Ok(buffer);
    }
    fs::read_to_string(path)
        .map_err(|e| CliError::InvalidInput(format!("Cannot read {}: {}", path.display(), e)))
}
