use clap::{Args, Parser, Subcommand};
use std::sync::Arc;

use crate::app_state::AppState;
use crate::config::{ClipMode, SettingsOverrides, SkeletonPolicy};
use crate::config_loader::load_config;
use crate::errors::{GateError, GateResult};
use crate::pipeline::EvaluationResult;

/// Top-level CLI interface for the EDFL gate
#[derive(Parser)]
#[command(
    name = "edfl-gate",
    version,
    about = "Hallucination-risk gate: decide ANSWER or REFUSE from information sufficiency"
)]
pub struct Cli {
    /// Configuration file (defaults to edfl_gate.toml or $EDFL_CONFIG_PATH)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Host/IP to bind (overrides configuration)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Evaluate a single prompt and print the decision
    Evaluate {
        #[arg(short, long)]
        prompt: String,
        #[command(flatten)]
        settings: SettingFlags,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default evaluation settings
    Defaults,

    /// List the accepted model ids
    Models,
}

/// Per-evaluation overrides; absent flags keep the configured defaults
#[derive(Args, Debug, Default)]
pub struct SettingFlags {
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub h_star: Option<f64>,
    #[arg(long)]
    pub n_samples: Option<usize>,
    #[arg(long)]
    pub m: Option<usize>,
    #[arg(long)]
    pub skeleton_policy: Option<SkeletonPolicy>,
    #[arg(long)]
    pub temperature: Option<f64>,
    #[arg(long)]
    pub isr_threshold: Option<f64>,
    #[arg(long)]
    pub margin_extra_bits: Option<f64>,
    #[arg(long = "b-clip")]
    pub b_clip: Option<f64>,
    #[arg(long)]
    pub clip_mode: Option<ClipMode>,
    #[arg(long)]
    pub generate_answer: bool,
    /// Passed through to gpt-5 family models
    #[arg(long)]
    pub verbosity: Option<String>,
    #[arg(long)]
    pub reasoning_effort: Option<String>,
}

impl SettingFlags {
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            model: self.model.clone(),
            h_star: self.h_star,
            n_samples: self.n_samples,
            m: self.m,
            skeleton_policy: self.skeleton_policy,
            temperature: self.temperature,
            isr_threshold: self.isr_threshold,
            margin_extra_bits: self.margin_extra_bits,
            b_clip: self.b_clip,
            clip_mode: self.clip_mode,
            generate_answer: self.generate_answer.then_some(true),
            verbosity: self.verbosity.clone(),
            reasoning_effort: self.reasoning_effort.clone(),
        }
    }
}

pub async fn dispatch(cli: Cli) -> GateResult<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            let state = Arc::new(AppState::from_config(&config)?);
            let host = host.unwrap_or_else(|| config.host.clone());
            let port = port.unwrap_or(config.port);
            crate::server::serve(state, &host, port).await
        }
        Commands::Evaluate {
            prompt,
            settings,
            json,
        } => {
            let state = AppState::from_config(&config)?;
            let settings = state.defaults.with_overrides(&settings.overrides());
            let result = state.evaluator.evaluate(&prompt, &settings).await?;
            if json {
                print_json(&result)
            } else {
                print_summary(&result);
                Ok(())
            }
        }
        Commands::Defaults => print_json(&config.default_settings()?),
        Commands::Models => {
            for model in &config.provider.models {
                println!("{model}");
            }
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> GateResult<()> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| GateError::serialization("render CLI output", e))?;
    println!("{out}");
    Ok(())
}

fn print_summary(result: &EvaluationResult) {
    let m = &result.metrics;
    println!("Decision:       {}", result.decision);
    println!("Δ̄ (nats):       {:.4}", m.delta_bar);
    println!("B2T (nats):     {:.4}", m.b2t);
    println!("ISR:            {:.3}", m.isr);
    println!("RoH bound:      {:.4}", m.roh_bound);
    println!("q_conservative: {:.4}", m.q_conservative);
    println!("q_avg:          {:.4}", m.q_avg);
    if result.diagnostics.degraded {
        println!(
            "Degraded:       skeleton variants {:?} excluded",
            result.diagnostics.excluded_variants
        );
    }
    println!("Rationale:      {}", result.rationale);
    if let Some(answer) = &result.answer {
        println!("Answer:         {answer}");
    }
    println!("Certificate:    {}", result.sla_certificate.digest);
}
