//! Workflow interpreter.
//!
//! Executes one workflow against one device channel under a cooperative
//! cancellation token. The interpreter is a match over the step sum:
//! input steps inject events, observation steps loop screenshot → match →
//! sleep within their explicit budgets, and `repeat_group` re-executes a
//! labelled subset of steps.
//!
//! Steps are authored in workflow space. Screenshots are rescaled to the
//! workflow's declared resolution before sampling or matching, and every
//! coordinate that reaches the device is scaled to its native resolution.
//!
//! Bridge errors propagate unchanged so callers can tell a dead device
//! from a step that missed its observation budget.

use crate::bridge::channel::DeviceChannel;
use crate::constants::timeouts::COLD_START_WAIT;
use crate::engine::cancel::CancelToken;
use crate::imaging::{best_match, match_all, Frame, Match};
use crate::models::error::{EngineError, EngineResult};
use crate::models::workflow::{OnMatchAction, StepAction, Workflow, WorkflowStep};
use crate::store::templates::TemplateStore;
use image::GrayImage;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct WorkflowInterpreter {
    templates: Arc<TemplateStore>,
    cold_start_wait: Duration,
}

/// Immutable per-run context threaded through step execution.
struct RunContext<'a> {
    workflow: &'a Workflow,
    device: &'a DeviceChannel,
    cancel: &'a CancelToken,
    device_size: (u32, u32),
}

impl WorkflowInterpreter {
    pub fn new(templates: Arc<TemplateStore>) -> Self {
        Self {
            templates,
            cold_start_wait: COLD_START_WAIT,
        }
    }

    pub fn with_cold_start_wait(mut self, wait: Duration) -> Self {
        self.cold_start_wait = wait;
        self
    }

    /// Runs the workflow to completion. Validation failures reject before
    /// any device command is issued.
    pub async fn run(
        &self,
        workflow: &Workflow,
        device: &DeviceChannel,
        cancel: &CancelToken,
    ) -> EngineResult<()> {
        workflow.validate()?;
        let known = self.templates.names().await;
        workflow.validate_templates(|name| known.contains(name))?;

        let device_size = device.screen_size().await?;
        let ctx = RunContext {
            workflow,
            device,
            cancel,
            device_size,
        };

        log::info!(
            "running workflow '{}' on {} ({} steps)",
            workflow.name,
            device.serial(),
            workflow.steps.len()
        );

        for step in workflow.ordered_steps() {
            ensure_active(cancel)?;
            self.exec_step(&ctx, step).await?;
        }

        log::info!("workflow '{}' done on {}", workflow.name, device.serial());
        Ok(())
    }

    async fn exec_step(&self, ctx: &RunContext<'_>, step: &WorkflowStep) -> EngineResult<()> {
        log::debug!(
            "step {} ({}) on {}",
            step.order_index,
            step.action.type_name(),
            ctx.device.serial()
        );

        match &step.action {
            StepAction::Click { x, y } => {
                let (dx, dy) = scale_point(ctx, *x, *y);
                ctx.device.tap(dx, dy).await
            }
            StepAction::Swipe {
                x,
                y,
                end_x,
                end_y,
                swipe_duration_ms,
            } => {
                let (sx, sy) = scale_point(ctx, *x, *y);
                let (ex, ey) = scale_point(ctx, *end_x, *end_y);
                ctx.device.swipe(sx, sy, ex, ey, *swipe_duration_ms).await
            }
            StepAction::Wait { wait_duration_ms } => {
                if !ctx
                    .cancel
                    .sleep(Duration::from_millis(*wait_duration_ms))
                    .await
                {
                    return Err(EngineError::Cancelled);
                }
                Ok(())
            }
            StepAction::WaitForColor {
                x,
                y,
                expected_color,
                tolerance,
                max_wait_seconds,
                check_interval,
            } => {
                self.wait_for_color(
                    ctx,
                    step,
                    (*x, *y),
                    *expected_color,
                    *tolerance,
                    *max_wait_seconds,
                    *check_interval,
                )
                .await
            }
            StepAction::ImageMatch {
                template_ref,
                threshold,
                max_wait_seconds,
                max_retries,
                retry_interval,
                skip_if_not_found,
                on_match_action,
            } => {
                self.image_match(
                    ctx,
                    step,
                    template_ref,
                    *threshold,
                    *max_wait_seconds,
                    *max_retries,
                    *retry_interval,
                    *skip_if_not_found,
                    *on_match_action,
                )
                .await
            }
            StepAction::FindAllClick {
                template_ref,
                threshold,
                match_all: tap_all,
            } => self.find_all_click(ctx, template_ref, *threshold, *tap_all).await,
            StepAction::LoopClick {
                template_ref,
                threshold,
                max_iterations,
                not_found_threshold,
                click_delay,
                retry_delay,
            } => {
                self.loop_click(
                    ctx,
                    template_ref,
                    *threshold,
                    *max_iterations,
                    *not_found_threshold,
                    *click_delay,
                    *retry_delay,
                )
                .await
            }
            StepAction::RepeatGroup {
                loop_group_name,
                stop_template_ref,
                stop_on_not_found,
                loop_max_iterations,
                threshold,
            } => {
                self.repeat_group(
                    ctx,
                    loop_group_name,
                    stop_template_ref.as_deref(),
                    *stop_on_not_found,
                    *loop_max_iterations,
                    *threshold,
                )
                .await
            }
            StepAction::PressBack => ctx.device.back().await,
            StepAction::StartGame => ctx.device.launch_app().await,
            StepAction::RestartGame => {
                ctx.device.restart_game().await?;
                if !ctx.cancel.sleep(self.cold_start_wait).await {
                    return Err(EngineError::Cancelled);
                }
                Ok(())
            }
        }
    }

    /// Screenshot rescaled to workflow resolution.
    async fn observe(&self, ctx: &RunContext<'_>) -> EngineResult<Frame> {
        let frame = ctx.device.screenshot().await?;
        Ok(frame.resized(ctx.workflow.screen_width, ctx.workflow.screen_height))
    }

    async fn load_needle(&self, name: &str) -> EngineResult<(Arc<Frame>, GrayImage)> {
        let frame = self.templates.load(name).await?;
        let gray = frame.to_gray();
        Ok((frame, gray))
    }

    #[allow(clippy::too_many_arguments)]
    async fn wait_for_color(
        &self,
        ctx: &RunContext<'_>,
        step: &WorkflowStep,
        point: (i64, i64),
        expected: [u8; 3],
        tolerance: u8,
        max_wait_seconds: f64,
        check_interval: f64,
    ) -> EngineResult<()> {
        let start = Instant::now();
        let (x, y) = point;
        loop {
            ensure_active(ctx.cancel)?;
            let frame = self.observe(ctx).await?;
            let sample = frame
                .bgr_at(x.max(0) as u32, y.max(0) as u32)
                .ok_or_else(|| {
                    EngineError::step_failed(
                        step.order_index,
                        step.action.type_name(),
                        format!("pixel ({x},{y}) outside {}x{} frame", frame.width(), frame.height()),
                    )
                })?;
            if channels_within(sample, expected, tolerance) {
                return Ok(());
            }
            if start.elapsed().as_secs_f64() >= max_wait_seconds {
                return Err(EngineError::step_failed(
                    step.order_index,
                    step.action.type_name(),
                    format!(
                        "color {expected:?} not seen at ({x},{y}) within {max_wait_seconds}s (last {sample:?})"
                    ),
                ));
            }
            if !ctx.cancel.sleep_secs(check_interval).await {
                return Err(EngineError::Cancelled);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn image_match(
        &self,
        ctx: &RunContext<'_>,
        step: &WorkflowStep,
        template_ref: &str,
        threshold: f32,
        max_wait_seconds: f64,
        max_retries: Option<u32>,
        retry_interval: f64,
        skip_if_not_found: bool,
        on_match: OnMatchAction,
    ) -> EngineResult<()> {
        let (needle, needle_gray) = self.load_needle(template_ref).await?;
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            ensure_active(ctx.cancel)?;
            let frame = self.observe(ctx).await?;
            if let Some(found) = best_match(&frame.to_gray(), &needle_gray, threshold) {
                log::debug!(
                    "template '{template_ref}' at ({}, {}) confidence {:.3}",
                    found.x,
                    found.y,
                    found.confidence
                );
                if on_match == OnMatchAction::TapCenter {
                    self.tap_match_center(ctx, &found, &needle).await?;
                }
                return Ok(());
            }

            attempts += 1;
            let out_of_retries = max_retries.is_some_and(|limit| attempts >= limit);
            let out_of_time = start.elapsed().as_secs_f64() >= max_wait_seconds;
            if out_of_retries || out_of_time {
                if skip_if_not_found {
                    log::debug!("template '{template_ref}' not found, step skipped");
                    return Ok(());
                }
                return Err(EngineError::step_failed(
                    step.order_index,
                    step.action.type_name(),
                    format!(
                        "template '{template_ref}' not found after {attempts} attempts ({:.1}s)",
                        start.elapsed().as_secs_f64()
                    ),
                ));
            }
            if !ctx.cancel.sleep_secs(retry_interval).await {
                return Err(EngineError::Cancelled);
            }
        }
    }

    async fn find_all_click(
        &self,
        ctx: &RunContext<'_>,
        template_ref: &str,
        threshold: f32,
        tap_all: bool,
    ) -> EngineResult<()> {
        let (needle, needle_gray) = self.load_needle(template_ref).await?;
        let frame = self.observe(ctx).await?;
        let matches = match_all(&frame.to_gray(), &needle_gray, threshold);
        if matches.is_empty() {
            log::debug!("template '{template_ref}' not on screen, nothing to tap");
            return Ok(());
        }
        let targets: &[Match] = if tap_all { &matches } else { &matches[..1] };
        for found in targets {
            ensure_active(ctx.cancel)?;
            self.tap_match_center(ctx, found, &needle).await?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn loop_click(
        &self,
        ctx: &RunContext<'_>,
        template_ref: &str,
        threshold: f32,
        max_iterations: u32,
        not_found_threshold: u32,
        click_delay: f64,
        retry_delay: f64,
    ) -> EngineResult<()> {
        let (needle, needle_gray) = self.load_needle(template_ref).await?;
        let mut not_found: u32 = 0;

        for _ in 0..max_iterations {
            ensure_active(ctx.cancel)?;
            let frame = self.observe(ctx).await?;
            match best_match(&frame.to_gray(), &needle_gray, threshold) {
                Some(found) => {
                    not_found = 0;
                    self.tap_match_center(ctx, &found, &needle).await?;
                    if !ctx.cancel.sleep_secs(click_delay).await {
                        return Err(EngineError::Cancelled);
                    }
                }
                None => {
                    not_found += 1;
                    if not_found >= not_found_threshold {
                        return Ok(());
                    }
                    if !ctx.cancel.sleep_secs(retry_delay).await {
                        return Err(EngineError::Cancelled);
                    }
                }
            }
        }
        log::debug!("loop_click on '{template_ref}' hit max_iterations ({max_iterations})");
        Ok(())
    }

    async fn repeat_group(
        &self,
        ctx: &RunContext<'_>,
        group: &str,
        stop_template_ref: Option<&str>,
        stop_on_not_found: bool,
        loop_max_iterations: u32,
        threshold: f32,
    ) -> EngineResult<()> {
        let members = ctx.workflow.group_steps(group);
        let stop_needle = match stop_template_ref {
            Some(name) => Some(self.load_needle(name).await?),
            None => None,
        };

        for iteration in 0..loop_max_iterations {
            ensure_active(ctx.cancel)?;

            if let Some((_, needle_gray)) = &stop_needle {
                let frame = self.observe(ctx).await?;
                let present = best_match(&frame.to_gray(), needle_gray, threshold).is_some();
                let stop = if stop_on_not_found { !present } else { present };
                if stop {
                    log::debug!("group '{group}' stop condition met after {iteration} iterations");
                    return Ok(());
                }
            }

            for member in &members {
                ensure_active(ctx.cancel)?;
                self.exec_step_boxed(ctx, member).await?;
            }
        }
        Ok(())
    }

    /// Indirection that makes group recursion representable: the future of
    /// `exec_step` contains `repeat_group`'s, which re-enters through a box.
    fn exec_step_boxed<'a>(
        &'a self,
        ctx: &'a RunContext<'a>,
        step: &'a WorkflowStep,
    ) -> Pin<Box<dyn Future<Output = EngineResult<()>> + Send + 'a>> {
        Box::pin(self.exec_step(ctx, step))
    }

    /// Taps the center of a match, scaled from workflow to device space.
    async fn tap_match_center(
        &self,
        ctx: &RunContext<'_>,
        found: &Match,
        needle: &Frame,
    ) -> EngineResult<()> {
        let (cx, cy) = found.center(needle.width(), needle.height());
        let (dx, dy) = scale_point(ctx, cx as i64, cy as i64);
        ctx.device.tap(dx, dy).await
    }
}

fn ensure_active(cancel: &CancelToken) -> EngineResult<()> {
    if cancel.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Workflow-space point to device-native pixels.
fn scale_point(ctx: &RunContext<'_>, x: i64, y: i64) -> (i64, i64) {
    let (dw, dh) = ctx.device_size;
    let ww = ctx.workflow.screen_width.max(1) as f64;
    let wh = ctx.workflow.screen_height.max(1) as f64;
    let dx = (x as f64 * dw as f64 / ww).round() as i64;
    let dy = (y as f64 * dh as f64 / wh).round() as i64;
    (dx, dy)
}

fn channels_within(sample: [u8; 3], expected: [u8; 3], tolerance: u8) -> bool {
    sample
        .iter()
        .zip(expected.iter())
        .all(|(s, e)| s.abs_diff(*e) <= tolerance)
}
