//! Command-line interface for videoforge.
//!
//! One subcommand per pipeline variant, plus publishing and config
//! inspection. Commands build the stage set from the environment, run the
//! orchestrator, and print where the finished video landed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{
    ElevenLabsStage, FalAnimationStage, FalImageStage, FileDelivery, GrokContextStage,
    PexelsFootageStage, PublishRequest, RunwayAvatarStage, ScribeStage, Visibility,
    YouTubePublisher,
};
use crate::config::{self, ResolvedConfig};
use crate::core::{LogProgress, Orchestrator, Stages};
use crate::domain::{PipelineRequest, PipelineVariant, RunState};

/// videoforge - prompt-to-video pipeline
#[derive(Parser, Debug)]
#[command(name = "videoforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Requester identity; keys the isolated work area
    #[arg(long, global = true, default_value = "cli")]
    pub requester: String,

    /// Directory finished videos are copied into
    #[arg(long, global = true, default_value = "output")]
    pub out: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a short-form animated video from a topic
    Animate {
        /// Topic or story idea
        topic: String,

        /// Number of scenes to plan
        #[arg(short, long, default_value = "4")]
        scenes: u32,
    },

    /// Generate a reaction video to a tweet or post
    React {
        /// The post text being reacted to
        post: String,

        /// Number of scenes to plan
        #[arg(short, long, default_value = "4")]
        scenes: u32,
    },

    /// Generate a long-form narrated video
    Narrate {
        /// Topic to narrate
        topic: String,

        /// Target length in minutes
        #[arg(short, long, default_value = "10")]
        minutes: u32,
    },

    /// Generate a single avatar clip speaking the given script
    Avatar {
        /// Script the avatar speaks
        script: String,

        /// Target clip length in seconds
        #[arg(short, long, default_value = "8")]
        seconds: u32,
    },

    /// Upload a finished video to YouTube
    Publish {
        /// Path to the video file
        video: PathBuf,

        /// Video title
        #[arg(short, long)]
        title: String,

        /// Video description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,

        /// Privacy setting
        #[arg(long, value_enum, default_value = "unlisted")]
        visibility: VisibilityArg,
    },

    /// Show resolved configuration and which stages are usable
    Config,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum VisibilityArg {
    Public,
    Unlisted,
    Private,
}

impl From<VisibilityArg> for Visibility {
    fn from(arg: VisibilityArg) -> Self {
        match arg {
            VisibilityArg::Public => Self::Public,
            VisibilityArg::Unlisted => Self::Unlisted,
            VisibilityArg::Private => Self::Private,
        }
    }
}

/// Wire the stage set from configured credentials.
fn build_stages(cfg: &ResolvedConfig) -> Stages {
    let creds = &cfg.credentials;
    let limits = &cfg.limits;
    Stages {
        script: Arc::new(ScribeStage::new(creds.anthropic_api_key.clone())),
        context: Arc::new(GrokContextStage::new(creds.xai_api_key.clone())),
        image: Arc::new(FalImageStage::new(
            creds.fal_key.clone(),
            limits.image_timeout,
        )),
        animation: Arc::new(FalAnimationStage::new(
            creds.fal_key.clone(),
            limits.animation_timeout,
        )),
        avatar: Arc::new(RunwayAvatarStage::new(
            creds.runway_api_key.clone(),
            limits.avatar_timeout,
        )),
        speech: Arc::new(ElevenLabsStage::new(creds.elevenlabs_api_key.clone())),
        footage: Arc::new(PexelsFootageStage::new(creds.pexels_api_key.clone())),
    }
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Animate { ref topic, scenes } => {
                self.run_pipeline(cfg, topic.clone(), PipelineVariant::AnimatedShort { scenes })
                    .await
            }
            Commands::React { ref post, scenes } => {
                self.run_pipeline(cfg, post.clone(), PipelineVariant::TweetReaction { scenes })
                    .await
            }
            Commands::Narrate { ref topic, minutes } => {
                self.run_pipeline(cfg, topic.clone(), PipelineVariant::Narrated { minutes })
                    .await
            }
            Commands::Avatar { ref script, seconds } => {
                self.run_pipeline(cfg, script.clone(), PipelineVariant::Avatar { seconds })
                    .await
            }
            Commands::Publish {
                ref video,
                ref title,
                ref description,
                ref tags,
                visibility,
            } => {
                let publisher = YouTubePublisher::new(
                    cfg.credentials.youtube_client_id.clone(),
                    cfg.credentials.youtube_client_secret.clone(),
                    config::youtube_token_path()?,
                );
                if !publisher.is_available() {
                    bail!(
                        "publishing needs YOUTUBE_CLIENT_ID, YOUTUBE_CLIENT_SECRET and a stored token at {}",
                        config::youtube_token_path()?.display()
                    );
                }

                let request = PublishRequest {
                    video_path: video.clone(),
                    title: title.clone(),
                    description: description.clone(),
                    tags: tags
                        .as_deref()
                        .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
                        .unwrap_or_default(),
                    visibility: visibility.into(),
                };
                let url = publisher
                    .publish(&request)
                    .await
                    .context("upload failed")?;
                println!("Published: {url}");
                Ok(())
            }
            Commands::Config => {
                println!("Home:      {}", cfg.home.display());
                println!("Work root: {}", cfg.work_root.display());
                match &cfg.config_file {
                    Some(path) => println!("Config:    {}", path.display()),
                    None => println!("Config:    (defaults)"),
                }
                println!();

                let stages = build_stages(cfg);
                let report = |name: &str, ok: bool| {
                    println!("  {name:<12} {}", if ok { "configured" } else { "missing" })
                };
                report("script", stages.script.is_available());
                report("context", stages.context.is_available());
                report("image", stages.image.is_available());
                report("animation", stages.animation.is_available());
                report("avatar", stages.avatar.is_available());
                report("speech", stages.speech.is_available());
                report("footage", stages.footage.is_available());
                Ok(())
            }
        }
    }

    async fn run_pipeline(
        &self,
        cfg: &ResolvedConfig,
        source_text: String,
        variant: PipelineVariant,
    ) -> Result<()> {
        let stages = build_stages(cfg);
        let delivery = Arc::new(FileDelivery::new(&self.out));
        let orchestrator = Orchestrator::new(
            stages,
            delivery,
            &cfg.work_root,
            cfg.limits.delivery_ceiling_bytes,
        )
        .with_progress(Arc::new(LogProgress));

        let request = PipelineRequest::new(&self.requester, source_text, variant);
        let run = orchestrator.run(&request).await;

        match run.state {
            RunState::Done => {
                let output = run
                    .output_path
                    .context("run finished without an output path")?;
                println!("Done: {}", output.display());
                Ok(())
            }
            RunState::Failed { error } => bail!("run failed: {error}"),
            other => bail!("run ended in unexpected state {other:?}"),
        }
    }
}
