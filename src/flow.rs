use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::AbortHandle;

use crate::api::{CreateResponse, StoryApi};
use crate::error::FlowError;
use crate::story::node::{NodeId, StoryNode};
use crate::story::tree::{narrative_text, ParentMap, Story};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Poll budget for asynchronous generation. Defaults give ~15s worst case.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub poll_attempts: u32,
    pub poll_delay: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            poll_attempts: 25,
            poll_delay: Duration::from_millis(600),
        }
    }
}

/// Result of a selection: did the chosen id exist in the loaded story?
/// The position moves either way; `NotFound` flags a broken link so the
/// caller can tell a valid navigation from a dangling reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Found,
    NotFound,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

struct PollTask {
    job_id: String,
    abort: AbortHandle,
}

/// Owns the loaded story, the reader's position in it, and the derived
/// parent map. `start` drives the whole create/poll/fetch sequence; `choose`
/// and `reset` mutate position; everything else is a pure projection.
pub struct StoryFlow<A> {
    api: A,
    config: FlowConfig,
    story: Option<Story>,
    current_node_id: Option<NodeId>,
    parents: ParentMap,
    error: Option<String>,
    loading: bool,
    poll: Option<PollTask>,
}

impl<A> StoryFlow<A>
where
    A: StoryApi + Clone + Send + Sync + 'static,
{
    pub fn new(api: A, config: FlowConfig) -> Self {
        Self {
            api,
            config,
            story: None,
            current_node_id: None,
            parents: ParentMap::default(),
            error: None,
            loading: false,
            poll: None,
        }
    }

    // -- state projections --------------------------------------------------

    pub fn story(&self) -> Option<&Story> {
        self.story.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn current_node_id(&self) -> Option<NodeId> {
        self.current_node_id
    }

    /// `None` both when nothing is loaded and when the current id is missing
    /// from the story (a broken link the renderer must tolerate).
    pub fn current_node(&self) -> Option<&StoryNode> {
        self.story.as_ref()?.get(self.current_node_id?)
    }

    /// Node ids from the root to the current position, root first. Empty when
    /// no story is loaded.
    pub fn current_path(&self) -> Vec<NodeId> {
        match (&self.story, self.current_node_id) {
            (Some(story), Some(id)) => self.parents.path_to(story.root_id(), id),
            _ => Vec::new(),
        }
    }

    /// The narrative so far: path contents joined by blank lines.
    pub fn narrative(&self) -> String {
        match &self.story {
            Some(story) => narrative_text(story, &self.current_path()),
            None => String::new(),
        }
    }

    /// Search string for a decorative backdrop image: story title, else the
    /// theme, else "adventure", with a fixed thematic suffix.
    pub fn background_query(&self, theme: &str) -> String {
        let base = self
            .story
            .as_ref()
            .map(|s| s.title.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or(if theme.is_empty() { "adventure" } else { theme });
        format!("{base} fantasy")
    }

    // -- operations ---------------------------------------------------------

    /// Run the full generation sequence for `theme`. On success the story is
    /// loaded, the position sits at the root, and the parent map is rebuilt.
    /// On failure the user-facing message lands in `error()`. The loading
    /// flag clears on every exit path.
    pub async fn start(&mut self, theme: &str) {
        self.cancel_poll();
        self.story = None;
        self.current_node_id = None;
        self.parents = ParentMap::default();
        self.error = None;
        self.loading = true;

        let outcome = self.run_generation(theme).await;
        self.loading = false;

        if let Err(err) = outcome {
            let message = err.to_string();
            warn!("generation failed: {message}");
            self.error = Some(if message.is_empty() {
                "Something went wrong".to_string()
            } else {
                message
            });
        }
    }

    /// Move the reader to `id`. The position updates unconditionally; the
    /// return value reports whether the id exists in the loaded story.
    pub fn choose(&mut self, id: NodeId) -> Selection {
        self.current_node_id = Some(id);
        let known = self.story.as_ref().is_some_and(|s| s.get(id).is_some());
        if known {
            debug!("moved to node {id}");
            Selection::Found
        } else {
            warn!("selected node {id} is not in the loaded story");
            Selection::NotFound
        }
    }

    /// Drop the loaded story and all derived state, cancelling any
    /// outstanding poll first so a stale loop cannot overwrite the cleared
    /// state later.
    pub fn reset(&mut self) {
        self.cancel_poll();
        self.story = None;
        self.current_node_id = None;
        self.parents = ParentMap::default();
        self.error = None;
    }

    // -- internals ----------------------------------------------------------

    async fn run_generation(&mut self, theme: &str) -> Result<(), FlowError> {
        let created = self.api.create_story(theme).await?;
        let story_id = self.resolve_story_id(created).await?;
        let story = self.api.get_complete_story(story_id).await?;
        info!(
            "story {} loaded: \"{}\" ({} nodes)",
            story.id,
            story.title,
            story.all_nodes.len()
        );
        self.parents = ParentMap::build(&story);
        self.current_node_id = Some(story.root_id());
        self.story = Some(story);
        Ok(())
    }

    /// Turn a create response into a story id: immediately when the backend
    /// finished synchronously, via the poll loop when it enqueued a job.
    async fn resolve_story_id(&mut self, created: CreateResponse) -> Result<u64, FlowError> {
        if let Some(id) = created.story_id {
            debug!("generation completed synchronously, story {id}");
            return Ok(id);
        }
        if created.status.as_deref() == Some("failed") {
            return Err(FlowError::JobFailed(
                created.error.unwrap_or_else(|| "Generation failed".to_string()),
            ));
        }
        let job_id = created.job_id.ok_or(FlowError::StoryIdMissing)?;
        self.poll_job(job_id).await
    }

    /// The poll loop runs as its own task keyed by job id, with the abort
    /// handle kept on the controller. `reset` or a newer `start` aborts it,
    /// so a superseded loop can never write back stale results.
    async fn poll_job(&mut self, job_id: String) -> Result<u64, FlowError> {
        let api = self.api.clone();
        let attempts = self.config.poll_attempts;
        let delay = self.config.poll_delay;
        let poll_job_id = job_id.clone();

        let handle = tokio::spawn(async move {
            for attempt in 1..=attempts {
                tokio::time::sleep(delay).await;
                let job = api.get_job(&poll_job_id).await?;
                debug!(
                    "poll {attempt}/{attempts}: job {poll_job_id} is {}",
                    job.status
                );
                if job.is_completed() {
                    if let Some(id) = job.story_id {
                        return Ok(id);
                    }
                } else if job.is_failed() {
                    return Err(FlowError::JobFailed(
                        job.error.unwrap_or_else(|| "Generation failed".to_string()),
                    ));
                }
            }
            Err(FlowError::StoryIdMissing)
        });

        self.poll = Some(PollTask {
            job_id,
            abort: handle.abort_handle(),
        });
        let joined = handle.await;
        self.poll = None;

        match joined {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(FlowError::Cancelled),
            Err(err) => Err(FlowError::JobFailed(format!("poll task failed: {err}"))),
        }
    }

    fn cancel_poll(&mut self) {
        if let Some(poll) = self.poll.take() {
            debug!("cancelling outstanding poll for job {}", poll.job_id);
            poll.abort.abort();
        }
    }
}

impl<A> Drop for StoryFlow<A> {
    fn drop(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.abort.abort();
        }
    }
}
