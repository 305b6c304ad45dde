//! Prompt arbitration across observer surfaces
//!
//! Several surfaces may observe the same execution, but at most one may
//! render a pending decision or selection prompt. Surfaces register with a
//! visibility predicate; ownership is granted only to a visible surface
//! and re-evaluated whenever visibility changes. A hidden surface releases
//! its prompt without submitting anything on the user's behalf.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use trellis_core::{ExecutionId, PromptRequest};

/// Value object: observer surface ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub String);

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

type VisibilityProbe = Box<dyn Fn() -> bool + Send + Sync>;

/// Decides which single observer surface may render a pending prompt
pub struct PromptArbiter {
    // Registration order is the tie-break when several surfaces are visible.
    surfaces: Vec<(SurfaceId, VisibilityProbe)>,
    pending: Option<PromptRequest>,
    owner: Option<SurfaceId>,
}

impl PromptArbiter {
    /// Create an arbiter with no surfaces and no pending prompt
    pub fn new() -> Self {
        Self {
            surfaces: Vec::new(),
            pending: None,
            owner: None,
        }
    }

    /// Register an observer surface with its visibility predicate
    pub fn register_surface<F>(&mut self, surface: SurfaceId, is_visible: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        debug!(surface = %surface, "Surface registered");
        self.surfaces.retain(|(id, _)| id != &surface);
        self.surfaces.push((surface, Box::new(is_visible)));
    }

    /// Remove a surface, releasing its prompt if it owned one
    pub fn unregister_surface(&mut self, surface: &SurfaceId) {
        self.surfaces.retain(|(id, _)| id != surface);
        if self.owner.as_ref() == Some(surface) {
            debug!(surface = %surface, "Owning surface unregistered; releasing prompt");
            self.owner = None;
        }
    }

    /// Install a pending prompt, applying precedence
    ///
    /// Returns `false` when the offered prompt is refused because a
    /// decision for the same execution is already pending. A decision
    /// displaces a pending selection for the same execution immediately.
    pub fn offer(&mut self, request: PromptRequest) -> bool {
        if let Some(pending) = &self.pending {
            if !request.supersedes(pending) {
                debug!(
                    execution_id = %request.execution_id(),
                    "Selection refused; a decision is already pending"
                );
                return false;
            }
            if pending.is_decision() || !request.is_decision() {
                debug!(execution_id = %pending.execution_id(), "Replacing pending prompt");
            } else {
                info!(
                    execution_id = %pending.execution_id(),
                    "Decision supersedes pending selection"
                );
            }
        }
        self.pending = Some(request);
        self.owner = None;
        self.reevaluate();
        true
    }

    /// Attempt to acquire rendering ownership of a prompt for a surface
    ///
    /// Installs the request (subject to precedence) and grants ownership
    /// only if the surface is currently visible. A hidden surface must not
    /// render the request.
    pub fn try_acquire(&mut self, surface: &SurfaceId, request: PromptRequest) -> bool {
        if let Some(pending) = &self.pending {
            if pending == &request {
                // Already installed; only ownership is in question.
                if self.owner.is_some() && self.owner.as_ref() != Some(surface) {
                    return false;
                }
            } else if !request.supersedes(pending) {
                return false;
            } else {
                self.pending = Some(request);
                self.owner = None;
            }
        } else {
            self.pending = Some(request);
            self.owner = None;
        }

        if self.is_visible(surface) {
            debug!(surface = %surface, "Prompt acquired");
            self.owner = Some(surface.clone());
            true
        } else {
            debug!(surface = %surface, "Hidden surface refused prompt ownership");
            false
        }
    }

    /// Re-evaluate ownership after a visibility change
    ///
    /// A newly hidden owner releases the prompt without submitting; a
    /// still-pending prompt is granted to the first visible surface in
    /// registration order.
    pub fn reevaluate(&mut self) {
        if let Some(owner) = &self.owner {
            if !self.is_visible(owner) {
                debug!(surface = %owner, "Owning surface hidden; releasing prompt");
                self.owner = None;
            }
        }

        if self.pending.is_some() && self.owner.is_none() {
            if let Some((surface, _)) = self.surfaces.iter().find(|(_, probe)| probe()) {
                debug!(surface = %surface, "Prompt granted to visible surface");
                self.owner = Some(surface.clone());
            }
        }
    }

    /// Consume the pending prompt for an execution after a submit
    pub fn resolve(&mut self, execution_id: &ExecutionId) {
        if let Some(pending) = &self.pending {
            if pending.execution_id() == execution_id {
                debug!(execution_id = %execution_id, "Prompt resolved");
                self.pending = None;
                self.owner = None;
            }
        }
    }

    /// Stop rendering an expired prompt without submitting anything
    ///
    /// Advisory only; the server's own timeout handling is authoritative.
    pub fn expire(&mut self, execution_id: &ExecutionId) {
        if let Some(pending) = &self.pending {
            if pending.execution_id() == execution_id {
                info!(execution_id = %execution_id, "Prompt expired without submission");
                self.pending = None;
                self.owner = None;
            }
        }
    }

    /// The pending prompt, if any
    pub fn pending(&self) -> Option<&PromptRequest> {
        self.pending.as_ref()
    }

    /// The surface currently owning the pending prompt, if any
    pub fn owner(&self) -> Option<&SurfaceId> {
        self.owner.as_ref()
    }

    /// Whether a surface owns the pending prompt
    pub fn is_owner(&self, surface: &SurfaceId) -> bool {
        self.owner.as_ref() == Some(surface)
    }

    fn is_visible(&self, surface: &SurfaceId) -> bool {
        self.surfaces
            .iter()
            .find(|(id, _)| id == surface)
            .map(|(_, probe)| probe())
            .unwrap_or(false)
    }
}

impl Default for PromptArbiter {
    fn default() -> Self {
        Self::new()
    }
}
