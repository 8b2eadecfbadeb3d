/// Mock graphics device for unit tests (no GPU required)
///
/// Records every command per recording buffer, tracks live images and
/// views, and lets tests defer fence completion or inject failures.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::graphics_device::{
    CommandAllocator, CommandList, CommandQueue, DescriptorAllocator, Fence, GraphicsDevice,
    ImageDesc, ImageFormat, ImageState, ScissorRect, Swapchain, Viewport, WindowSurface,
};
use crate::log::{LogEntry, LogSeverity, LogSink, Logger};

// ============================================================================
// Shared mock state
// ============================================================================

#[derive(Default)]
pub struct MockState {
    next_id: u64,
    pub live_images: FxHashSet<u64>,
    pub live_views: FxHashSet<u64>,
    pub created_images: Vec<ImageDesc>,
    pub executed_lists: Vec<u64>,
    pub presents: Vec<u32>,
    pub pending_signals: Vec<(MockFence, u64)>,
    pub defer_signals: bool,
    pub fail_image_creation: bool,
    pub fail_swapchain_resize: bool,
    pub fail_present: bool,
    pub fail_submit_with_device_lost: Option<u32>,
    pub device_lost: Option<u32>,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

type SharedState = Arc<Mutex<MockState>>;

// ============================================================================
// Mock Device
// ============================================================================

pub struct MockGraphicsDevice {
    state: SharedState,
    queue: MockQueue,
    descriptors: Mutex<DescriptorAllocator>,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self::with_descriptor_capacity(64)
    }

    pub fn with_descriptor_capacity(capacity: u32) -> Self {
        let state: SharedState = Arc::new(Mutex::new(MockState::default()));
        Self {
            queue: MockQueue { state: state.clone() },
            state,
            descriptors: Mutex::new(DescriptorAllocator::new(capacity)),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn live_image_count(&self) -> usize {
        self.state().live_images.len()
    }

    pub fn live_view_count(&self) -> usize {
        self.state().live_views.len()
    }

    pub fn descriptors_in_use(&self) -> u32 {
        self.descriptors.lock().unwrap().len()
    }

    /// Queue signals are held until `complete_pending_signals`
    pub fn set_defer_signals(&self, defer: bool) {
        self.state().defer_signals = defer;
    }

    /// Simulate the GPU finishing all signaled work
    pub fn complete_pending_signals(&self) {
        let pending = std::mem::take(&mut self.state().pending_signals);
        for (fence, value) in pending {
            fence.advance_to(value);
        }
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    type Image = MockImage;
    type View = MockView;
    type Queue = MockQueue;
    type Fence = MockFence;
    type CommandAllocator = MockCommandAllocator;
    type CommandList = MockCommandList;
    type Swapchain = MockSwapchain;

    fn queue(&self) -> &MockQueue {
        &self.queue
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<MockImage> {
        let mut state = self.state();
        if state.fail_image_creation {
            return Err(Error::ResourceCreationFailed("mock image creation failure".to_string()));
        }
        let id = state.next_id();
        state.live_images.insert(id);
        state.created_images.push(*desc);
        Ok(MockImage {
            id,
            desc: *desc,
            owned: true,
            state: self.state.clone(),
        })
    }

    fn create_view(&self, image: &MockImage, _desc: &ImageDesc, slot: Option<u32>) -> Result<MockView> {
        let mut state = self.state();
        let id = state.next_id();
        state.live_views.insert(id);
        Ok(MockView {
            id,
            image_id: image.id,
            slot,
            state: self.state.clone(),
        })
    }

    fn create_fence(&self, initial_value: u64) -> Result<MockFence> {
        Ok(MockFence::new(initial_value))
    }

    fn create_command_allocator(&self) -> Result<MockCommandAllocator> {
        let id = self.state().next_id();
        Ok(MockCommandAllocator { id, reset_count: 0 })
    }

    fn create_command_list(&self, allocator: &MockCommandAllocator) -> Result<MockCommandList> {
        let id = self.state().next_id();
        Ok(MockCommandList {
            id,
            allocator_id: allocator.id,
            recording: false,
            commands: Vec::new(),
        })
    }

    fn create_swapchain(
        &self,
        _window: &dyn WindowSurface,
        buffer_count: u32,
        width: u32,
        height: u32,
    ) -> Result<MockSwapchain> {
        let mut swapchain = MockSwapchain {
            width,
            height,
            format: ImageFormat::Rgba8,
            buffers: Vec::new(),
            presents: Vec::new(),
            resize_count: 0,
            state: self.state.clone(),
        };
        swapchain.allocate_buffers(buffer_count);
        Ok(swapchain)
    }

    fn descriptor_allocator(&self) -> &Mutex<DescriptorAllocator> {
        &self.descriptors
    }

    fn device_lost_reason(&self) -> Option<u32> {
        self.state().device_lost
    }
}

// ============================================================================
// Mock Image / View
// ============================================================================

pub struct MockImage {
    pub id: u64,
    pub desc: ImageDesc,
    pub owned: bool,
    state: SharedState,
}

impl Drop for MockImage {
    fn drop(&mut self) {
        if self.owned {
            self.state.lock().unwrap().live_images.remove(&self.id);
        }
    }
}

pub struct MockView {
    pub id: u64,
    pub image_id: u64,
    pub slot: Option<u32>,
    state: SharedState,
}

impl Drop for MockView {
    fn drop(&mut self) {
        self.state.lock().unwrap().live_views.remove(&self.id);
    }
}

// ============================================================================
// Mock Queue / Fence
// ============================================================================

pub struct MockQueue {
    state: SharedState,
}

impl CommandQueue<MockGraphicsDevice> for MockQueue {
    fn execute(&self, lists: &[&MockCommandList]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.fail_submit_with_device_lost {
            state.device_lost = Some(reason);
            return Err(Error::BackendError("mock submit failure".to_string()));
        }
        for list in lists {
            if list.recording {
                return Err(Error::InvalidState("submitting an open command list".to_string()));
            }
            state.executed_lists.push(list.id);
        }
        Ok(())
    }

    fn signal(&self, fence: &MockFence, value: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.defer_signals {
            state.pending_signals.push((fence.clone(), value));
        } else {
            fence.advance_to(value);
        }
        Ok(())
    }
}

/// Fence whose completed value is advanced by the mock queue or by tests
#[derive(Clone)]
pub struct MockFence {
    shared: Arc<(Mutex<u64>, Condvar)>,
}

impl MockFence {
    pub fn new(initial_value: u64) -> Self {
        Self {
            shared: Arc::new((Mutex::new(initial_value), Condvar::new())),
        }
    }

    pub fn advance_to(&self, value: u64) {
        let (completed, cvar) = &*self.shared;
        let mut completed = completed.lock().unwrap();
        if value > *completed {
            *completed = value;
        }
        cvar.notify_all();
    }
}

impl Fence for MockFence {
    fn completed_value(&self) -> Result<u64> {
        Ok(*self.shared.0.lock().unwrap())
    }

    fn wait_for_value(&self, value: u64) -> Result<()> {
        let (completed, cvar) = &*self.shared;
        let mut completed = completed.lock().unwrap();
        while *completed < value {
            completed = cvar.wait(completed).unwrap();
        }
        Ok(())
    }
}

// ============================================================================
// Mock Command Allocator / List
// ============================================================================

pub struct MockCommandAllocator {
    pub id: u64,
    pub reset_count: u32,
}

impl CommandAllocator for MockCommandAllocator {
    fn reset(&mut self) -> Result<()> {
        self.reset_count += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    Barrier { image: u64, before: ImageState, after: ImageState },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetRenderTargets { colors: Vec<u64>, depth: Option<u64> },
    ClearColor { view: u64, color: [f32; 4] },
    ClearDepthStencil { view: u64, depth: f32, stencil: u8 },
    Discard { image: u64 },
    CloseRenderScope,
    Close,
}

pub struct MockCommandList {
    pub id: u64,
    pub allocator_id: u64,
    pub recording: bool,
    pub commands: Vec<MockCommand>,
}

impl MockCommandList {
    fn record(&mut self, command: MockCommand) -> Result<()> {
        if !self.recording {
            return Err(Error::InvalidState("command list is closed".to_string()));
        }
        self.commands.push(command);
        Ok(())
    }

    /// Barriers recorded since the last reset, as (image, before, after)
    pub fn barriers(&self) -> Vec<(u64, ImageState, ImageState)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                MockCommand::Barrier { image, before, after } => Some((*image, *before, *after)),
                _ => None,
            })
            .collect()
    }
}

impl CommandList<MockGraphicsDevice> for MockCommandList {
    fn reset(&mut self, allocator: &MockCommandAllocator) -> Result<()> {
        self.allocator_id = allocator.id;
        self.commands.clear();
        self.recording = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.record(MockCommand::Close)?;
        self.recording = false;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn transition_barrier(&mut self, image: &MockImage, before: ImageState, after: ImageState) -> Result<()> {
        self.record(MockCommand::Barrier { image: image.id, before, after })
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        self.record(MockCommand::SetViewport(*viewport))
    }

    fn set_scissor(&mut self, rect: &ScissorRect) -> Result<()> {
        self.record(MockCommand::SetScissor(*rect))
    }

    fn set_render_targets(&mut self, colors: &[&MockView], depth: Option<&MockView>) -> Result<()> {
        self.record(MockCommand::SetRenderTargets {
            colors: colors.iter().map(|v| v.id).collect(),
            depth: depth.map(|v| v.id),
        })
    }

    fn clear_render_target(&mut self, view: &MockView, color: [f32; 4]) -> Result<()> {
        self.record(MockCommand::ClearColor { view: view.id, color })
    }

    fn clear_depth_stencil(&mut self, view: &MockView, depth: f32, stencil: u8) -> Result<()> {
        self.record(MockCommand::ClearDepthStencil { view: view.id, depth, stencil })
    }

    fn discard(&mut self, image: &MockImage) -> Result<()> {
        self.record(MockCommand::Discard { image: image.id })
    }

    fn close_render_scope(&mut self) -> Result<()> {
        self.record(MockCommand::CloseRenderScope)
    }
}

// ============================================================================
// Mock Swapchain
// ============================================================================

pub struct MockSwapchain {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub buffers: Vec<u64>,
    pub presents: Vec<u32>,
    pub resize_count: u32,
    state: SharedState,
}

impl MockSwapchain {
    fn allocate_buffers(&mut self, count: u32) {
        let mut state = self.state.lock().unwrap();
        self.buffers = (0..count).map(|_| state.next_id()).collect();
    }
}

impl Swapchain<MockGraphicsDevice> for MockSwapchain {
    fn buffer_count(&self) -> u32 {
        self.buffers.len() as u32
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> ImageFormat {
        self.format
    }

    fn backing_image(&self, index: u32) -> Result<MockImage> {
        let id = *self
            .buffers
            .get(index as usize)
            .ok_or_else(|| Error::InvalidResource(format!("no backing buffer {}", index)))?;
        Ok(MockImage {
            id,
            desc: ImageDesc::swapchain_color(self.width, self.height, self.format),
            owned: false,
            state: self.state.clone(),
        })
    }

    fn resize_buffers(&mut self, buffer_count: u32, width: u32, height: u32) -> Result<()> {
        if self.state.lock().unwrap().fail_swapchain_resize {
            return Err(Error::BackendError("mock swapchain resize failure".to_string()));
        }
        self.width = width;
        self.height = height;
        self.resize_count += 1;
        self.allocate_buffers(buffer_count);
        Ok(())
    }

    fn present(&mut self, index: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_present {
            return Err(Error::BackendError("mock present failure".to_string()));
        }
        self.presents.push(index);
        state.presents.push(index);
        Ok(())
    }
}

// ============================================================================
// Mock Window
// ============================================================================

pub struct MockWindow {
    width: AtomicU32,
    height: AtomicU32,
    close_requested: AtomicBool,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width: AtomicU32::new(width),
            height: AtomicU32::new(height),
            close_requested: AtomicBool::new(false),
        })
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.width.store(width, Ordering::Relaxed);
        self.height.store(height, Ordering::Relaxed);
    }

    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::Relaxed);
    }
}

impl WindowSurface for MockWindow {
    fn id(&self) -> u64 {
        1
    }

    fn width(&self) -> u32 {
        self.width.load(Ordering::Relaxed)
    }

    fn height(&self) -> u32 {
        self.height.load(Ordering::Relaxed)
    }

    fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Relaxed)
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        Err(Error::InitializationFailed("mock window has no native handle".to_string()))
    }
}

// ============================================================================
// Capturing logger
// ============================================================================

pub struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

/// Sink recording every entry, plus the shared entry list
pub fn capture_sink() -> (LogSink, Arc<Mutex<Vec<LogEntry>>>) {
    let entries = Arc::new(Mutex::new(Vec::new()));
    (LogSink::new(CaptureLogger { entries: entries.clone() }), entries)
}

/// Number of ERROR entries captured
pub fn error_count(entries: &Arc<Mutex<Vec<LogEntry>>>) -> usize {
    entries
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.severity == LogSeverity::Error)
        .count()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
