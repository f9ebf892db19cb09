//! Command execution against a [`DocService`].

use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::cli::output::{OutputFormat, render};
use crate::cli::parser::{Cli, Commands};
use crate::config::ServiceConfig;
use crate::error::{Error, MAX_PAYLOAD_BYTES, Result};
use crate::rag::RagResponse;
use crate::search::SearchFilters;
use crate::service::{
    AnswerRequest, CompareReply, DocService, SearchReply, ServiceDeps, SyncReport,
};
use crate::update::{UpdateIntent, UpdateSuggestion};

/// Executes the parsed command and returns the rendered output.
///
/// # Errors
///
/// Propagates configuration, corpus, and operation errors.
pub async fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let mut builder = ServiceConfig::builder().from_env();
    if let Some(root) = &cli.root {
        builder = builder.root(root);
    }
    let watch = matches!(cli.command, Commands::Watch);
    let config = builder.watch_enabled(watch).build()?;
    if !config.root.is_dir() {
        return Err(Error::Config {
            message: format!("corpus root is not a directory: {}", config.root.display()),
        });
    }
    let service = DocService::new(config);

    let output = match &cli.command {
        Commands::Index => {
            let report = service.sync_vectors().await?;
            render(&report, render_sync(&report), format)
        }
        Commands::Search {
            query,
            release,
            service: service_filter,
            doc_types,
            max_results,
        } => {
            let filters = SearchFilters {
                release: release.clone(),
                service: service_filter.clone(),
                doc_types: if doc_types.is_empty() {
                    None
                } else {
                    Some(doc_types.clone())
                },
            };
            let reply = service.search(query, &filters, *max_results).await?;
            render(&reply, render_search(&reply), format)
        }
        Commands::Answer {
            query,
            release,
            service: service_filter,
            doc_type,
            max_tokens,
            k,
        } => {
            let request = AnswerRequest {
                query: query.clone(),
                filters: SearchFilters {
                    release: release.clone(),
                    service: service_filter.clone(),
                    doc_types: doc_type.clone().map(|dt| vec![dt]),
                },
                max_tokens: *max_tokens,
                k: *k,
            };
            let response = service.answer(&request).await?;
            render(&response, render_answer(&response), format)
        }
        Commands::Suggest {
            intent,
            context,
            target_file,
            target_release,
        } => {
            let context = match context.as_deref() {
                Some("-") => Some(read_stdin()?),
                other => other.map(str::to_string),
            };
            let request = UpdateIntent {
                intent: intent.clone(),
                context,
                target_file: target_file.clone(),
                target_release: target_release.clone(),
            };
            let suggestion = service.suggest_update(&request).await?;
            render(&suggestion, render_suggestion(&suggestion), format)
        }
        Commands::Apply {
            target,
            diff_file,
            force,
        } => {
            let diff = match diff_file {
                Some(path) => read_payload_file(path)?,
                None => read_stdin()?,
            };
            let outcome = service.apply_update(target, &diff, *force).await?;
            let text = match &outcome.error {
                Some(error) => format!("{}: {error}", outcome.status),
                None => format!("{}: wrote {}", outcome.status, outcome.path.display()),
            };
            render(&outcome, text, format)
        }
        Commands::Compare { feature, releases } => {
            let releases = if releases.is_empty() {
                None
            } else {
                Some(releases.clone())
            };
            let reply = service.compare_releases(feature, releases).await?;
            render(&reply, render_compare(&reply), format)
        }
        Commands::Deps {
            service: name,
            release,
            data_flow,
        } => {
            let deps = service
                .service_dependencies(name, release, *data_flow)
                .await?;
            render(&deps, render_deps(&deps), format)
        }
        Commands::Refresh => {
            service.refresh();
            render(
                &serde_json::json!({"status": "ok", "refreshed": true}),
                "caches invalidated".to_string(),
                format,
            )
        }
        Commands::Watch => {
            service.start()?;
            info!("watching; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.map_err(Error::from)?;
            service.shutdown().await;
            "watch stopped\n".to_string()
        }
        Commands::Health => {
            let health = service.health();
            render(
                &health,
                format!("{} (uptime {}s)\n", health.status, health.uptime_secs),
                format,
            )
        }
        Commands::Metrics => {
            let snapshot = service.metrics();
            render(
                &snapshot,
                format!(
                    "requests: {}\nerrors: {}\navg latency: {:.1} ms\n",
                    snapshot.requests, snapshot.errors, snapshot.avg_latency_ms
                ),
                format,
            )
        }
    };
    Ok(output)
}

/// Reads stdin with the transport payload cap applied.
fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .take((MAX_PAYLOAD_BYTES + 1) as u64)
        .read_to_string(&mut buffer)?;
    check_payload(buffer.len())?;
    Ok(buffer)
}

/// Reads a diff file with the transport payload cap applied.
fn read_payload_file(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path)?;
    check_payload(contents.len())?;
    Ok(contents)
}

fn check_payload(size: usize) -> Result<()> {
    if size > MAX_PAYLOAD_BYTES {
        return Err(Error::PayloadTooLarge {
            size,
            max: MAX_PAYLOAD_BYTES,
        });
    }
    Ok(())
}

fn render_sync(report: &SyncReport) -> String {
    format!(
        "indexed {} files, {} sections, {} chunks ({} tokens)\n",
        report.files, report.sections, report.chunks, report.tokens
    )
}

fn render_search(reply: &SearchReply) -> String {
    match reply {
        SearchReply::NotFound { query } => format!("no documentation found for: {query}\n"),
        SearchReply::Ok { results } => {
            let mut out = String::new();
            for (i, row) in results.iter().enumerate() {
                out.push_str(&format!(
                    "{}. [{:.0}] {} ({} L{}-{})\n   {}\n",
                    i + 1,
                    row.score,
                    row.heading,
                    row.file,
                    row.line_start,
                    row.line_end,
                    row.match_reasons.join("; "),
                ));
            }
            out
        }
    }
}

fn render_answer(response: &RagResponse) -> String {
    let mut out = String::new();
    out.push_str(&response.answer);
    out.push('\n');
    if !response.citations.is_empty() {
        out.push_str("\nSources:\n");
        for citation in &response.citations {
            out.push_str(&format!(
                "- {} ({} L{}-{})\n",
                citation.heading, citation.file, citation.line_start, citation.line_end
            ));
        }
    }
    out.push_str(&format!(
        "\ngrounding: {:.2}{}\n",
        response.grounding_score,
        if response.insufficient_evidence {
            " (insufficient evidence)"
        } else {
            ""
        }
    ));
    out
}

fn render_suggestion(suggestion: &UpdateSuggestion) -> String {
    let mut out = format!(
        "{:?} {}\n{}\n",
        suggestion.action,
        suggestion.target_path.display(),
        suggestion.rationale
    );
    if !suggestion.duplicates.is_empty() {
        out.push_str(&format!("duplicates: {}\n", suggestion.duplicates.len()));
    }
    for conflict in &suggestion.conflicts {
        out.push_str(&format!("conflict: {}\n", conflict.reason));
    }
    if suggestion.blocked {
        out.push_str("BLOCKED: resolve conflicts or apply with --force\n");
    }
    out.push_str("\n--- diff ---\n");
    out.push_str(&suggestion.diff);
    out
}

fn render_compare(reply: &CompareReply) -> String {
    let mut out = format!("feature: {}\n", reply.feature);
    for summary in &reply.releases {
        match &summary.best {
            Some(row) => out.push_str(&format!(
                "{}: {} ({} L{}-{})\n",
                summary.release, row.heading, row.file, row.line_start, row.line_end
            )),
            None => out.push_str(&format!("{}: no match\n", summary.release)),
        }
    }
    out
}

fn render_deps(deps: &ServiceDeps) -> String {
    let mut out = format!("{} in {}\n", deps.service, deps.release);
    out.push_str(&format!("inbound: {}\n", list_or_dash(&deps.inbound)));
    out.push_str(&format!("outbound: {}\n", list_or_dash(&deps.outbound)));
    if let Some(flow) = &deps.data_flow {
        out.push_str("data flow:\n");
        for line in flow {
            out.push_str(&format!("  {line}\n"));
        }
    }
    out
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::SearchRow;

    #[test]
    fn test_check_payload_cap() {
        assert!(check_payload(10).is_ok());
        assert!(check_payload(MAX_PAYLOAD_BYTES).is_ok());
        assert!(matches!(
            check_payload(MAX_PAYLOAD_BYTES + 1),
            Err(Error::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_render_search_rows() {
        let reply = SearchReply::Ok {
            results: vec![SearchRow {
                file: "R1-NOTES.md".to_string(),
                heading: "Auth".to_string(),
                line_start: 1,
                line_end: 4,
                release: "R1".to_string(),
                doc_type: "NOTES".to_string(),
                score: 115.0,
                match_reasons: vec!["Exact match in heading".to_string()],
                snippet: "body".to_string(),
            }],
        };
        let text = render_search(&reply);
        assert!(text.contains("Auth"));
        assert!(text.contains("R1-NOTES.md L1-4"));
        assert!(text.contains("Exact match in heading"));
    }

    #[test]
    fn test_render_search_not_found() {
        let reply = SearchReply::NotFound {
            query: "xyz".to_string(),
        };
        assert!(render_search(&reply).contains("no documentation found"));
    }
}
