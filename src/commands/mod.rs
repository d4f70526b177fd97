
use anyhow::{Context, Result, bail};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info};

use crate::config::Config;
use crate::rag::{
    ChatExchange, ChatRequest, InitReport, LiveComponents, RagService, SystemStatus,
    ValidationError,
};

/// Build the service from `config` and run initialization
#[inline]
pub async fn start_service(config: Config) -> (RagService, InitReport) {
    info!(
        "Starting service with documents from {}",
        config.documents_path().display()
    );
    let retrieval = config.retrieval.clone();
    let service = RagService::new(Arc::new(LiveComponents::new(config)), retrieval);
    let report = service.initialize().await;
    (service, report)
}

/// Load the per-user configuration and start a usable service
///
/// Fails when the generator could not be brought up.
#[inline]
pub async fn start_default_service() -> Result<RagService> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let (service, report) = start_service(config).await;

    if !report.usable {
        error!("Service is unusable after initialization");
        bail!(
            "Initialization failed: {}",
            report
                .diagnostic
                .unwrap_or_else(|| "unknown error".to_string())
        );
    }

    Ok(service)
}

/// Initialize and print the resulting status
#[inline]
pub async fn show_status(json: bool) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let (service, _) = start_service(config).await;
    let status = service.status().await;
    service.shutdown().await;

    let mut stdout = std::io::stdout().lock();
    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&status)?)?;
    } else {
        write_status(&status, &mut stdout)?;
    }
    Ok(())
}

/// Answer a single question and exit
#[inline]
pub async fn ask(message: &str, k: Option<i64>, json: bool) -> Result<()> {
    let service = start_default_service().await?;
    let result = answer(&service, message, k).await;
    service.shutdown().await;

    let exchange = match result {
        Ok(exchange) => exchange,
        Err(e) => bail!("Invalid request ({}): {}", e.code(), e),
    };

    let mut stdout = std::io::stdout().lock();
    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&exchange)?)?;
    } else {
        write_exchange(&exchange, &mut stdout)?;
    }
    Ok(())
}

/// Interactive session on stdin
#[inline]
pub async fn chat(k: Option<i64>) -> Result<()> {
    let service = start_default_service().await?;

    println!("Ready in {} mode. Commands: /status, /reinit, /exit", service.mode().await);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = chat_loop(&service, k, stdin, &mut std::io::stdout()).await;

    service.shutdown().await;
    result
}

/// Validate and answer one message
#[inline]
pub async fn answer(
    service: &RagService,
    message: &str,
    k: Option<i64>,
) -> std::result::Result<ChatExchange, ValidationError> {
    let request = ChatRequest::new(message, k)?;
    service.chat(&request).await
}

/// Read messages line by line until end of input or `/exit`
#[inline]
pub async fn chat_loop<R, W>(
    service: &RagService,
    k: Option<i64>,
    input: R,
    output: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    loop {
        write!(output, "> ")?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(output)?;
            break;
        };

        match line.trim() {
            "" => {}
            "/exit" | "/quit" => break,
            "/status" => write_status(&service.status().await, output)?,
            "/reinit" => write_status(&service.reinitialize().await, output)?,
            message => match answer(service, message, k).await {
                Ok(exchange) => write_exchange(&exchange, output)?,
                Err(e) => writeln!(output, "Rejected ({}): {}", e.code(), e)?,
            },
        }
    }

    Ok(())
}

#[inline]
pub fn write_status<W: Write>(status: &SystemStatus, output: &mut W) -> Result<()> {
    writeln!(output, "Status: {}", status.message)?;
    writeln!(output, "  Mode: {}", status.mode)?;
    writeln!(output, "  LLM ready: {}", yes_no(status.llm_ready))?;
    writeln!(output, "  Vector index ready: {}", yes_no(status.db_ready))?;
    writeln!(
        output,
        "  RAG pipeline ready: {}",
        yes_no(status.rag_pipeline_ready)
    )?;

    if status.loaded_documents.is_empty() {
        writeln!(output, "  Documents: none")?;
    } else {
        writeln!(output, "  Documents ({}):", status.loaded_documents.len())?;
        for source in &status.loaded_documents {
            writeln!(output, "    - {}", source)?;
        }
    }

    if let Some(error) = &status.initialization_error {
        writeln!(output, "  Last error: {}", error)?;
    }
    Ok(())
}

#[inline]
pub fn write_exchange<W: Write>(exchange: &ChatExchange, output: &mut W) -> Result<()> {
    writeln!(output, "{}", exchange.answer)?;
    writeln!(output)?;
    writeln!(
        output,
        "[{}] {}",
        exchange.mode, exchange.context_summary
    )?;
    for (i, source) in exchange.sources.iter().enumerate() {
        writeln!(
            output,
            "  {}. {} (page {}) score {:.4}",
            i + 1,
            source.source_file,
            source.page,
            source.score
        )?;
    }
    Ok(())
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
