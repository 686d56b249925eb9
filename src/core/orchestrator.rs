//! Drives one request from confirmation to a delivered video.
//!
//! The orchestrator owns the run state machine
//! (Planning -> AssetGeneration -> Assembly -> Delivery -> Done | Failed)
//! and the two recovery rules that keep a run alive:
//! - a content-policy rejection earns exactly one retry with a sanitized
//!   prompt, per scene
//! - a narrated run whose visuals fail downgrades once to stock footage
//!
//! Every exit path cleans the work area; success keeps only the final
//! artifact.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::{
    AnimationStage, AvatarStage, ContextStage, DeliveryPayload, DeliverySink, FootageStage,
    ImageStage, ScriptStage, SpeechStage,
};
use crate::core::progress::{NullProgress, ProgressSink};
use crate::core::workdir::WorkArea;
use crate::domain::{
    chapter_count_for_minutes, PipelineRequest, PipelineRun, PipelineVariant, RunState, Scene,
};
use crate::error::{StageError, StageResult};
use crate::media::assembly::{Assembler, AssemblyEngine, ChapterStill};

const TOTAL_STAGES: usize = 5;

/// Clips of stock footage fetched per search keyword.
const FOOTAGE_PER_KEYWORD: usize = 2;
const FOOTAGE_KEYWORDS: usize = 5;

/// The stage adapters a run draws on.
pub struct Stages {
    pub script: Arc<dyn ScriptStage>,
    pub context: Arc<dyn ContextStage>,
    pub image: Arc<dyn ImageStage>,
    pub animation: Arc<dyn AnimationStage>,
    pub avatar: Arc<dyn AvatarStage>,
    pub speech: Arc<dyn SpeechStage>,
    pub footage: Arc<dyn FootageStage>,
}

pub struct Orchestrator {
    stages: Stages,
    delivery: Arc<dyn DeliverySink>,
    progress: Arc<dyn ProgressSink>,
    engine: Arc<dyn AssemblyEngine>,
    work_root: PathBuf,
    delivery_ceiling: u64,
}

impl Orchestrator {
    pub fn new(
        stages: Stages,
        delivery: Arc<dyn DeliverySink>,
        work_root: impl Into<PathBuf>,
        delivery_ceiling: u64,
    ) -> Self {
        Self {
            stages,
            delivery,
            progress: Arc::new(NullProgress),
            engine: Arc::new(Assembler::new()),
            work_root: work_root.into(),
            delivery_ceiling,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Swap the ffmpeg-backed engine out, mainly for tests.
    pub fn with_engine(mut self, engine: Arc<dyn AssemblyEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Execute one request to a terminal state. Never panics or leaves the
    /// work area dirty; failures land in `RunState::Failed`.
    pub async fn run(&self, request: &PipelineRequest) -> PipelineRun {
        info!(
            request = %request.id,
            requester = %request.requester,
            variant = request.variant.name(),
            "Starting pipeline run"
        );

        let area = match WorkArea::allocate(&self.work_root, &request.requester, request.id).await
        {
            Ok(area) => area,
            Err(e) => {
                let mut run = PipelineRun::new(request.id, self.work_root.clone());
                run.state = RunState::Failed {
                    error: e.to_string(),
                };
                return run;
            }
        };

        let mut run = PipelineRun::new(request.id, area.dir().to_path_buf());

        match self.execute(request, &area, &mut run).await {
            Ok(delivered) => {
                run.state = RunState::Done;
                self.transition(&run, "video delivered").await;
                area.cleanup(run.output_path.as_deref()).await;
                info!(request = %request.id, delivered = %delivered.display(), "Run complete");
            }
            Err(e) => {
                warn!(request = %request.id, error = %e, "Run failed");
                run.state = RunState::Failed {
                    error: e.to_string(),
                };
                self.transition(&run, "run failed").await;
                area.cleanup(None).await;
            }
        }

        run
    }

    async fn execute(
        &self,
        request: &PipelineRequest,
        area: &WorkArea,
        run: &mut PipelineRun,
    ) -> StageResult<PathBuf> {
        let output = match request.variant {
            PipelineVariant::AnimatedShort { scenes } => {
                self.animated(&request.source_text, scenes, area, run).await?
            }
            PipelineVariant::TweetReaction { scenes } => {
                let brief = self.reaction_brief(&request.source_text).await?;
                self.animated(&brief, scenes, area, run).await?
            }
            PipelineVariant::Narrated { minutes } => {
                self.narrated(&request.source_text, minutes, area, run).await?
            }
            PipelineVariant::Avatar { seconds } => {
                self.avatar(&request.source_text, seconds, area, run).await?
            }
        };

        run.output_path = Some(output.clone());
        run.state = RunState::Delivery;
        self.transition(run, "delivering video").await;

        let payload = DeliveryPayload::classify(&output, self.delivery_ceiling)?;
        let delivered = self.delivery.deliver(&request.requester, &payload).await?;
        Ok(delivered)
    }

    async fn transition(&self, run: &PipelineRun, message: &str) {
        self.progress
            .update(run.state.stage_index().min(TOTAL_STAGES - 1), TOTAL_STAGES, message)
            .await;
    }

    /// Tweet reactions plan against a context analysis when the analysis
    /// stage is configured; otherwise the raw post text carries the brief.
    async fn reaction_brief(&self, source_text: &str) -> StageResult<String> {
        if !self.stages.context.is_available() {
            warn!("Context analysis not configured, planning from the post text alone");
            return Ok(source_text.to_string());
        }
        let analysis = self.stages.context.analyze(source_text).await?;
        Ok(format!("Post:\n{source_text}\n\nContext analysis:\n{analysis}"))
    }

    /// Rewrite a flagged prompt into safer language. A failed rewrite is
    /// best-effort: the original prompt is retried verbatim.
    async fn sanitized_or_original(&self, prompt: &str) -> String {
        match self.stages.script.sanitize_prompt(prompt).await {
            Ok(safer) => safer,
            Err(e) => {
                warn!(error = %e, "Prompt sanitizer failed, retrying the original prompt");
                prompt.to_string()
            }
        }
    }

    /// Content-policy rejections get one retry with a sanitized prompt;
    /// any other error propagates untouched.
    async fn image_with_retry(
        &self,
        prompt: &str,
        reference: Option<&str>,
    ) -> StageResult<String> {
        match self.stages.image.generate(prompt, reference).await {
            Err(e) if e.is_content_policy() => {
                warn!("Image prompt rejected on policy grounds, retrying sanitized");
                let retry = self.sanitized_or_original(prompt).await;
                self.stages.image.generate(&retry, reference).await
            }
            other => other,
        }
    }

    async fn animate_with_retry(&self, scene: &Scene, image_url: &str) -> StageResult<String> {
        match self
            .stages
            .animation
            .animate(image_url, &scene.animation_prompt, scene.duration_secs)
            .await
        {
            Err(e) if e.is_content_policy() => {
                warn!(scene = %scene.name, "Animation prompt rejected on policy grounds, retrying sanitized");
                let retry = self.sanitized_or_original(&scene.animation_prompt).await;
                self.stages
                    .animation
                    .animate(image_url, &retry, scene.duration_secs)
                    .await
            }
            other => other,
        }
    }

    /// Animated shorts: plan scenes, generate an image and a clip per
    /// scene (first image anchors character identity for the rest), then
    /// join the clips in scene order.
    async fn animated(
        &self,
        brief: &str,
        scene_count: u32,
        area: &WorkArea,
        run: &mut PipelineRun,
    ) -> StageResult<PathBuf> {
        self.transition(run, "planning scenes").await;
        let mut scenes = self.stages.script.plan_scenes(brief, scene_count).await?;

        run.state = RunState::AssetGeneration;
        let mut reference: Option<String> = None;
        let total = scenes.len();
        for (i, scene) in scenes.iter_mut().enumerate() {
            self.transition(
                run,
                &format!("generating scene {}/{} ({})", i + 1, total, scene.name),
            )
            .await;

            let image_url = self
                .image_with_retry(&scene.image_prompt, reference.as_deref())
                .await?;
            if reference.is_none() {
                reference = Some(image_url.clone());
            }
            scene.image_url = Some(image_url.clone());

            let clip_url = self.animate_with_retry(scene, &image_url).await?;
            scene.clip_url = Some(clip_url);
        }
        run.scenes = scenes;

        run.state = RunState::Assembly;
        self.transition(run, "assembling scenes").await;
        let mut clips = Vec::with_capacity(run.scenes.len());
        for (i, scene) in run.scenes.iter().enumerate() {
            let url = scene.assemblable_clip().ok_or_else(|| {
                StageError::assembly("scene clips", format!("scene {i} has no clip"))
            })?;
            let path = self
                .engine
                .download(area.dir(), url, &format!("scene_{i}.mp4"))
                .await?;
            run.asset_paths.push(path.clone());
            clips.push(path);
        }
        self.engine.assemble_scene_clips(area.dir(), &clips).await
    }

    /// Narrated long form: chaptered script, narration audio, one visual
    /// per chapter. Two one-time downgrades keep the run alive:
    /// - an unusable chaptered script falls back to a flat script with
    ///   stock-footage visuals
    /// - failed chapter visuals fall back to stock footage, reusing the
    ///   already-synthesized narration
    async fn narrated(
        &self,
        topic: &str,
        minutes: u32,
        area: &WorkArea,
        run: &mut PipelineRun,
    ) -> StageResult<PathBuf> {
        self.transition(run, "writing script").await;
        let script = match self.stages.script.structured_script(topic, minutes).await {
            Ok(script) => {
                info!(
                    chapters = script.chapters.len(),
                    target = chapter_count_for_minutes(minutes),
                    words = script.word_count(),
                    "Script ready"
                );
                Some(script)
            }
            Err(e) => {
                warn!(error = %e, "Chaptered script unusable, downgrading to flat script");
                run.downgraded = true;
                None
            }
        };

        let narration = match &script {
            Some(script) => {
                run.chapters = script.chapters.clone();
                script.joined_narration()
            }
            None => self.stages.script.flat_script(topic, minutes).await?,
        };

        run.state = RunState::AssetGeneration;
        self.transition(run, "synthesizing narration").await;
        let audio_bytes = self.stages.speech.synthesize(&narration).await?;
        let audio_path = area.file("narration.mp3");
        tokio::fs::write(&audio_path, &audio_bytes)
            .await
            .map_err(|e| StageError::assembly("narration", e.to_string()))?;
        run.audio_path = Some(audio_path.clone());

        if script.is_some() && !run.downgraded {
            match self.narrated_stills(area, run).await {
                Ok(stills) => {
                    run.state = RunState::Assembly;
                    self.transition(run, "assembling chapters").await;
                    return self
                        .engine
                        .assemble_stills(area.dir(), &stills, &audio_path)
                        .await;
                }
                Err(e) => {
                    warn!(error = %e, "Chapter visuals failed, downgrading to stock footage");
                    run.downgraded = true;
                }
            }
        }

        self.stock_composition(area, &narration, &audio_path, run)
            .await
    }

    /// Stock-footage composition over an already-synthesized narration
    /// track: extract keywords, fetch a clip pool, loop it to cover the
    /// audio.
    async fn stock_composition(
        &self,
        area: &WorkArea,
        narration: &str,
        audio_path: &std::path::Path,
        run: &mut PipelineRun,
    ) -> StageResult<PathBuf> {
        self.transition(run, "searching stock footage").await;
        let keywords = self
            .stages
            .script
            .extract_keywords(narration, FOOTAGE_KEYWORDS)
            .await?;
        let urls = self
            .stages
            .footage
            .search_many(&keywords, FOOTAGE_PER_KEYWORD)
            .await?;

        let mut clips = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            let path = self
                .engine
                .download(area.dir(), url, &format!("stock_{i}.mp4"))
                .await?;
            run.asset_paths.push(path.clone());
            clips.push(path);
        }

        run.state = RunState::Assembly;
        self.transition(run, "assembling stock footage").await;
        self.engine.assemble_stock(area.dir(), &clips, audio_path).await
    }

    async fn narrated_stills(
        &self,
        area: &WorkArea,
        run: &mut PipelineRun,
    ) -> StageResult<Vec<ChapterStill>> {
        let total = run.chapters.len();
        let mut stills = Vec::with_capacity(total);
        for i in 0..total {
            self.transition(
                run,
                &format!("rendering chapter visual {}/{}", i + 1, total),
            )
            .await;

            let image_url = self
                .image_with_retry(&run.chapters[i].visual, None)
                .await?;
            run.chapters[i].image_url = Some(image_url.clone());

            let image = self
                .engine
                .download(area.dir(), &image_url, &format!("chapter_{i}.png"))
                .await?;
            run.asset_paths.push(image.clone());
            stills.push(ChapterStill {
                image,
                narration_words: run.chapters[i].narration_word_count(),
            });
        }
        Ok(stills)
    }

    /// Single avatar clip rendered straight from the source text.
    async fn avatar(
        &self,
        script: &str,
        seconds: u32,
        area: &WorkArea,
        run: &mut PipelineRun,
    ) -> StageResult<PathBuf> {
        run.state = RunState::AssetGeneration;
        self.transition(run, "rendering avatar clip").await;

        let url = match self.stages.avatar.render(script, seconds).await {
            Err(e) if e.is_content_policy() => {
                warn!("Avatar script rejected on policy grounds, retrying sanitized");
                let retry = self.sanitized_or_original(script).await;
                self.stages.avatar.render(&retry, seconds).await?
            }
            other => other?,
        };

        run.state = RunState::Assembly;
        self.transition(run, "fetching avatar clip").await;
        let path = self.engine.download(area.dir(), &url, "final.mp4").await?;
        run.asset_paths.push(path.clone());
        Ok(path)
    }
}
