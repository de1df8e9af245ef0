mod acquire;
mod cli;
mod error;
mod highlight;
mod model;
mod rubric;
mod scorer;
mod server;
mod session;
mod util;

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use cli::CliArgs;
use error::Result;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn run(args: CliArgs) -> Result<()> {
    if let Some(url) = &args.acquire {
        return acquire_once(&args, url).await;
    }
    if args.frames.is_empty() {
        return Err(anyhow!(
            "nothing to do: pass --serve, --acquire <URL> or at least one --frame <PATH>"
        ));
    }
    score_frames(&args).await
}

async fn acquire_once(args: &CliArgs, url: &str) -> Result<()> {
    let extractor = acquire::YtDlpExtractor::new(args.yt_dlp.clone(), args.format.clone());
    let acquirer = acquire::Acquirer::new(Arc::new(extractor), args.acquire_config());
    let video = acquirer.acquire(url).await?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| format!("video.{}", video.container).into());
    tokio::fs::write(&output, &video.payload)
        .await
        .with_context(|| format!("writing video to {}", output.display()))?;

    println!("title: {}", video.title);
    println!("duration: {}s", video.duration_seconds);
    println!("size: {} bytes", video.size_bytes);
    println!("saved to: {}", output.display());
    Ok(())
}

async fn score_frames(args: &CliArgs) -> Result<()> {
    let api_key = args
        .api_key
        .as_deref()
        .ok_or_else(|| anyhow!("--api-key (or ANTHROPIC_API_KEY) is required to score frames"))?;
    let session = session::HttpSession::new(&args.session_config())?;
    let policy = args.scoring_policy();

    let mut scored = Vec::with_capacity(args.frames.len());
    for path in &args.frames {
        let frame = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading frame {}", path.display()))?;
        let request = scorer::ScoreRequest {
            frame: &frame,
            credential: api_key,
            model_id: &args.model,
            video_type: args.video_type,
        };
        match scorer::score_frame(&session, &request, &policy).await {
            Ok(result) => {
                println!("{}: {}/10 {}", path.display(), result.score, result.description);
                scored.push(highlight::ScoredFrame {
                    label: path.display().to_string(),
                    result,
                });
            }
            Err(err) => tracing::error!("scoring {} failed: {err}", path.display()),
        }
    }

    let highlights = highlight::select_highlights(scored, args.min_score);
    println!("highlights (score >= {}): {}", args.min_score, highlights.len());
    for frame in &highlights {
        println!("  {} {}/10 {}", frame.label, frame.result.score, frame.result.description);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = CliArgs::parse();

    let result = if args.serve {
        server::run_server(&args).await
    } else {
        run(args).await
    };

    if let Err(error) = result {
        tracing::error!("{error:?}");
        std::process::exit(1);
    }
}
