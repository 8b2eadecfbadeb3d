/// RenderOrchestrator - ordered registry of named passes

use crate::error::{Error, Result};
use crate::graphics_device::GraphicsDevice;
use crate::log::LogSink;
use crate::render::{FrameState, RenderContext, SharedRenderTarget};
use crate::{engine_error, engine_trace};

const SOURCE: &str = "ember::RenderOrchestrator";

/// Callback recording one pass into one target
pub type PassCallback<D> =
    Box<dyn FnMut(&mut RenderContext<D>, &SharedRenderTarget<D>) -> Result<()>>;

/// A pass: the targets it renders into and the callback recording it
pub struct RenderPass<D: GraphicsDevice> {
    targets: Vec<SharedRenderTarget<D>>,
    execute: PassCallback<D>,
}

impl<D: GraphicsDevice> RenderPass<D> {
    /// Create a pass
    ///
    /// # Arguments
    ///
    /// * `targets` - Targets visited in this order on every execution
    /// * `execute` - Called once per target with the bound context
    pub fn new<F>(targets: Vec<SharedRenderTarget<D>>, execute: F) -> Self
    where
        F: FnMut(&mut RenderContext<D>, &SharedRenderTarget<D>) -> Result<()> + 'static,
    {
        Self {
            targets,
            execute: Box::new(execute),
        }
    }

    pub fn targets(&self) -> &[SharedRenderTarget<D>] {
        &self.targets
    }

    /// Append a target to the pass
    pub fn add_target(&mut self, target: SharedRenderTarget<D>) {
        self.targets.push(target);
    }
}

/// Passes keyed by name, executed in registration order
///
/// Execution is strictly sequential: passes in the order they were added,
/// and within each pass, targets in the order they were given.
pub struct RenderOrchestrator<D: GraphicsDevice> {
    passes: Vec<(String, RenderPass<D>)>,
    log: LogSink,
}

impl<D: GraphicsDevice> RenderOrchestrator<D> {
    /// Create an empty orchestrator
    pub fn new(log: LogSink) -> Self {
        Self {
            passes: Vec::new(),
            log,
        }
    }

    /// Register `pass` under `name`
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicatePassName` if the name is taken; the
    /// registered pass is left untouched.
    pub fn new_pass(&mut self, name: &str, pass: RenderPass<D>) -> Result<()> {
        if self.get_pass(name).is_some() {
            return Err(self.log.report(SOURCE, Error::DuplicatePassName(name.to_string())));
        }
        self.passes.push((name.to_string(), pass));
        Ok(())
    }

    /// Pass registered under `name`
    pub fn get_pass(&self, name: &str) -> Option<&RenderPass<D>> {
        self.passes.iter().find(|(n, _)| n == name).map(|(_, pass)| pass)
    }

    /// Mutable pass registered under `name`
    pub fn get_pass_mut(&mut self, name: &str) -> Option<&mut RenderPass<D>> {
        self.passes.iter_mut().find(|(n, _)| n == name).map(|(_, pass)| pass)
    }

    /// Unregister a pass
    ///
    /// Returns the removed pass, or None if not found.
    pub fn remove_pass(&mut self, name: &str) -> Option<RenderPass<D>> {
        let index = self.passes.iter().position(|(n, _)| n == name)?;
        Some(self.passes.remove(index).1)
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Pass names in execution order
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Run every pass over every one of its targets
    ///
    /// Only targets whose slot for the context's frame number is recording
    /// are visited; non-functional, minimized or closed targets that were
    /// not started are skipped. A failing callback is logged and does not
    /// stop the other targets or passes. The first error is returned once
    /// every pass has run.
    pub fn execute(&mut self, ctx: &mut RenderContext<D>) -> Result<()> {
        let frame = ctx.frame_number();
        let mut result: Result<()> = Ok(());
        for (name, pass) in self.passes.iter_mut() {
            let RenderPass { targets, execute } = pass;
            for target in targets.iter() {
                let recording = {
                    let target = target.borrow();
                    target.is_functional() && target.frame_state(frame) == Some(FrameState::Recording)
                };
                if !recording {
                    engine_trace!(self.log, SOURCE, "Pass '{}' skips a target not recording frame {}", name, frame);
                    continue;
                }
                ctx.set_render_target(target);
                if let Err(e) = (*execute)(ctx, target) {
                    engine_error!(self.log, SOURCE, "Pass '{}' failed: {}", name, e);
                    result = result.and(Err(e));
                }
            }
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "render_orchestrator_tests.rs"]
mod tests;
